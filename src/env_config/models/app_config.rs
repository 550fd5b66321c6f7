use crate::db::postgres::repository::price_history_repository::PRICE_HISTORY_TABLE;
use crate::error::{PipelineError, PipelineResult, validate_table_name};
use crate::utils::time_window::{ResetRule, TimeWindow};
use serde::Deserialize;
use std::path::PathBuf;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub log: LogConfig,
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,
    pub streamer: StreamerConfig,
    pub fetcher: FetcherConfig,
    pub orchestrator: OrchestratorConfig,
    pub backup: BackupConfig,
    #[serde(default)]
    pub cleanup: Vec<CleanupConfig>,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Deserialize)]
pub struct PostgresConfig {
    pub timeout: u64,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: u64,
    pub idle_timeout: u64,
}

#[derive(Debug, Deserialize)]
pub struct RedisConfig {
    pub symbols_batch_size: usize,
    pub trade_ttl_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct StreamerConfig {
    pub url: String,
    pub reconnect_base_seconds: u64,
    pub reconnect_max_seconds: u64,
    pub read_timeout_seconds: u64,
    pub subscription_poll_seconds: u64,
    pub max_concurrent_writes: usize,
}

#[derive(Debug, Deserialize)]
pub struct FetcherConfig {
    pub interval_seconds: u64,
    pub window: TimeWindow,
    /// Standalone fetcher: sleep between window checks while paused.
    pub pause_check_seconds: u64,
    /// Skip records whose event timestamp was already inserted by this process.
    #[serde(default)]
    pub skip_unchanged_trades: bool,
}

#[derive(Debug, Deserialize)]
pub struct OrchestratorConfig {
    pub poll_seconds: u64,
    pub notify_channel: String,
    pub listener_retry_seconds: u64,
    #[serde(default = "default_true")]
    pub health_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct BackupConfig {
    pub enabled: bool,
    pub window: TimeWindow,
    pub output_path: PathBuf,
    /// Program and arguments; the exported file path is appended last.
    #[serde(default)]
    pub push_command: Vec<String>,
    /// Upper bound for export plus push, so the job is over before the
    /// history cleanup window closes.
    #[serde(default = "default_backup_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct CleanupConfig {
    pub table: String,
    pub window: TimeWindow,
    pub reset: ResetRule,
}

fn default_true() -> bool {
    true
}

fn default_backup_timeout() -> u64 {
    300
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> PipelineResult<Self> {
        let config: AppConfig =
            toml::from_str(raw).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would break the scheduling invariants.
    pub fn validate(&self) -> PipelineResult<()> {
        let invalid = |msg: String| Err(PipelineError::Config(msg));

        if self.fetcher.interval_seconds == 0 || self.orchestrator.poll_seconds == 0 {
            return invalid("fetcher.interval_seconds and orchestrator.poll_seconds must be > 0".into());
        }
        if self.streamer.max_concurrent_writes == 0 {
            return invalid("streamer.max_concurrent_writes must be > 0".into());
        }
        if self.streamer.reconnect_base_seconds == 0
            || self.streamer.reconnect_base_seconds > self.streamer.reconnect_max_seconds
        {
            return invalid("streamer reconnect delays must satisfy 0 < base <= max".into());
        }
        if self.redis.symbols_batch_size == 0 {
            return invalid("redis.symbols_batch_size must be > 0".into());
        }
        if self.backup.enabled && self.backup.push_command.is_empty() {
            return invalid("backup.push_command is required when backup is enabled".into());
        }
        if self.backup.enabled && self.backup.timeout_seconds == 0 {
            return invalid("backup.timeout_seconds must be > 0".into());
        }

        for cleanup in &self.cleanup {
            validate_table_name(&cleanup.table)?;
            if cleanup.table == PRICE_HISTORY_TABLE {
                if cleanup.window.overlaps(&self.fetcher.window) {
                    return invalid(format!(
                        "cleanup window {} for {} overlaps fetcher window {}",
                        cleanup.window, cleanup.table, self.fetcher.window
                    ));
                }
                if self.backup.enabled && cleanup.window.overlaps(&self.backup.window) {
                    return invalid(format!(
                        "cleanup window {} for {} overlaps backup window {}",
                        cleanup.window, cleanup.table, self.backup.window
                    ));
                }
                // Ticks are sequential: a backup entered at the end of its
                // window must time out while the cleanup window is still open.
                let slack = (cleanup.window.end - self.backup.window.end)
                    .num_seconds()
                    .rem_euclid(SECONDS_PER_DAY);
                if self.backup.enabled && self.backup.timeout_seconds as i64 >= slack {
                    return invalid(format!(
                        "backup.timeout_seconds {} outlasts cleanup window {} for {}",
                        self.backup.timeout_seconds, cleanup.window, cleanup.table
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_CONFIG: &str = r#"
[log]
level = "info"
format = "plain"

[postgres]
timeout = 10
max_connections = 5
min_connections = 1
max_lifetime = 1800
idle_timeout = 600

[redis]
symbols_batch_size = 1000
trade_ttl_seconds = 3600

[streamer]
url = "wss://ws.finnhub.io"
reconnect_base_seconds = 3
reconnect_max_seconds = 60
read_timeout_seconds = 30
subscription_poll_seconds = 30
max_concurrent_writes = 100

[fetcher]
interval_seconds = 10
pause_check_seconds = 60
window = { start_time = "00:32:00", end_time = "23:59:50" }

[orchestrator]
poll_seconds = 30
notify_channel = "instrument_changed"
listener_retry_seconds = 5

[backup]
enabled = true
window = { start_time = "00:00:00", end_time = "00:05:00" }
output_path = "price_history.csv"
push_command = ["./scripts/push_backup.sh"]
timeout_seconds = 300

[[cleanup]]
table = "price_history"
window = { start_time = "00:05:00", end_time = "00:30:00" }
reset = "window_exit"

[[cleanup]]
table = "predicted_prices"
window = { start_time = "23:00:00", end_time = "00:00:00" }
reset = "date_rollover"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_parses() {
        let config = AppConfig::from_toml_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.cleanup.len(), 2);
        assert_eq!(config.cleanup[1].reset, ResetRule::DateRollover);
        assert!(!config.fetcher.skip_unchanged_trades);
        assert!(config.orchestrator.health_enabled);
    }

    #[test]
    fn test_history_cleanup_overlapping_fetcher_is_rejected() {
        let raw = SAMPLE_CONFIG.replace(
            "window = { start_time = \"00:05:00\", end_time = \"00:30:00\" }",
            "window = { start_time = \"00:05:00\", end_time = \"00:40:00\" }",
        );
        let err = AppConfig::from_toml_str(&raw).unwrap_err();
        assert!(err.to_string().contains("overlaps fetcher window"));
    }

    #[test]
    fn test_invalid_cleanup_table_is_rejected() {
        let raw = SAMPLE_CONFIG.replace("table = \"predicted_prices\"", "table = \"x; drop\"");
        assert!(matches!(
            AppConfig::from_toml_str(&raw),
            Err(PipelineError::InvalidTableName(_))
        ));
    }

    #[test]
    fn test_backup_timeout_must_end_inside_history_cleanup_window() {
        let raw = SAMPLE_CONFIG.replace("timeout_seconds = 300", "timeout_seconds = 1500");
        let err = AppConfig::from_toml_str(&raw).unwrap_err();
        assert!(err.to_string().contains("outlasts cleanup window"));

        let raw = SAMPLE_CONFIG.replace("timeout_seconds = 300\n", "");
        let config = AppConfig::from_toml_str(&raw).unwrap();
        assert_eq!(config.backup.timeout_seconds, 300);
    }

    #[test]
    fn test_backoff_bounds_are_checked() {
        let raw = SAMPLE_CONFIG.replace("reconnect_max_seconds = 60", "reconnect_max_seconds = 1");
        assert!(AppConfig::from_toml_str(&raw).is_err());
    }
}
