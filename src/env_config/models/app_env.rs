use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Env {
    Local,
    Dev,
    Prod,
}

impl FromStr for Env {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Env::Local),
            "dev" => Ok(Env::Dev),
            "prod" => Ok(Env::Prod),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Env::Local => write!(f, "local"),
            Env::Dev => write!(f, "dev"),
            Env::Prod => write!(f, "prod"),
        }
    }
}

/// Endpoints and credentials taken from the process environment.
pub struct AppEnv {
    pub env: Env,
    pub server_port: u16,
    pub server_address: String,
    pub postgres_host: String,
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_database: String,
    pub redis_url: String,
    pub feed_api_key: Option<String>,
}

impl AppEnv {
    pub fn is_local(&self) -> bool {
        self.env == Env::Local
    }

    pub fn postgres_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}/{}",
            self.postgres_user, self.postgres_password, self.postgres_host, self.postgres_database
        )
    }
}

// Credentials stay out of `{:#?}` dumps in local mode.
impl fmt::Debug for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppEnv")
            .field("env", &self.env)
            .field("server_port", &self.server_port)
            .field("server_address", &self.server_address)
            .field("postgres_host", &self.postgres_host)
            .field("postgres_user", &self.postgres_user)
            .field("postgres_database", &self.postgres_database)
            .field("feed_api_key", &self.feed_api_key.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}
