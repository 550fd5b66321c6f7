use crate::db::postgres::connection::PostgresConnection;
use async_trait::async_trait;
use sqlx::Error as SqlxError;
use std::sync::Arc;
use tracing::{debug, error};

/// Table-level maintenance. Callers pass names already checked by
/// `validate_table_name`; they are interpolated, not bound.
#[async_trait]
pub trait TraitMaintenanceRepository {
    async fn table_not_empty(&self, table: &str) -> Result<bool, SqlxError>;

    /// TRUNCATE ... RESTART IDENTITY followed by VACUUM FULL ANALYZE
    async fn truncate_and_vacuum(&self, table: &str) -> Result<(), SqlxError>;
}

pub struct StructMaintenanceRepository {
    connection: Arc<PostgresConnection>,
}

impl StructMaintenanceRepository {
    pub fn new(connection: Arc<PostgresConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl TraitMaintenanceRepository for StructMaintenanceRepository {
    async fn table_not_empty(&self, table: &str) -> Result<bool, SqlxError> {
        let pool = self.connection.get_pool();

        let result = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} LIMIT 1)",
            table
        ))
        .fetch_one(pool)
        .await;

        match &result {
            Ok(not_empty) => debug!("Table {} not empty: {}", table, not_empty),
            Err(e) => error!("Error checking table {}: {}", table, e),
        }

        result
    }

    async fn truncate_and_vacuum(&self, table: &str) -> Result<(), SqlxError> {
        let pool = self.connection.get_pool();

        sqlx::query(&format!("TRUNCATE {} RESTART IDENTITY", table))
            .execute(pool)
            .await
            .inspect_err(|e| error!("Error truncating {}: {}", table, e))?;

        // VACUUM refuses to run inside a transaction block; the simple query
        // protocol keeps it a standalone statement.
        sqlx::raw_sql(&format!("VACUUM FULL ANALYZE {}", table))
            .execute(pool)
            .await
            .inspect_err(|e| error!("Error vacuuming {}: {}", table, e))?;

        debug!("Truncated and vacuumed {}", table);
        Ok(())
    }
}
