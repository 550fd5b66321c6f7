use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the pipeline services.
///
/// Repositories keep returning their driver errors; services wrap them here so
/// the scheduling loops can log one type at the operation boundary.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("feed error: {0}")]
    Feed(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv_async::Error),

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("table '{0}' is empty")]
    EmptyTable(String),

    #[error("subprocess '{command}' exited with {status}")]
    Subprocess { command: String, status: ExitStatus },

    #[error("{job} did not finish within {after:?}")]
    Timeout { job: String, after: Duration },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Accepts `table` or `schema.table` made of ASCII alphanumerics and underscores.
///
/// Table names end up interpolated into TRUNCATE/VACUUM statements, which
/// cannot take bind parameters.
pub fn validate_table_name(table: &str) -> PipelineResult<&str> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && !part.starts_with(|c: char| c.is_ascii_digit())
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| valid_part(p)) {
        return Err(PipelineError::InvalidTableName(table.to_string()));
    }
    Ok(table)
}
