use crate::db::postgres::repository::maintenance_repository::TraitMaintenanceRepository;
use crate::error::{PipelineResult, validate_table_name};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanOutcome {
    Truncated,
    AlreadyEmpty,
}

/// Empties a table and reclaims its storage, but only when it holds rows.
pub struct RetentionCleaner {
    maintenance: Arc<dyn TraitMaintenanceRepository + Send + Sync>,
}

impl RetentionCleaner {
    pub fn new(maintenance: Arc<dyn TraitMaintenanceRepository + Send + Sync>) -> Self {
        Self { maintenance }
    }

    pub async fn clean(&self, table: &str) -> PipelineResult<CleanOutcome> {
        let table = validate_table_name(table)?;

        if !self.maintenance.table_not_empty(table).await? {
            info!(table, "Table is already empty, skipping cleanup");
            return Ok(CleanOutcome::AlreadyEmpty);
        }

        self.maintenance.truncate_and_vacuum(table).await?;
        info!(table, "Table truncated and vacuumed");
        Ok(CleanOutcome::Truncated)
    }
}
