use super::models::{app_config::AppConfig, app_env::Env};
use std::fs;

const CONFIG_DIR: &str = "config";

impl AppConfig {
    /// Loads `config/<env>.toml`, panicking on a missing or invalid file.
    pub fn new(env: &Env) -> AppConfig {
        let path = format!("{}/{}.toml", CONFIG_DIR, env);
        let raw = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Failed to read config file {}: {}", path, e));

        AppConfig::from_toml_str(&raw)
            .unwrap_or_else(|e| panic!("Invalid config file {}: {}", path, e))
    }
}
