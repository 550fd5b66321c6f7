use crate::db::postgres::models::price_history::PriceHistoryRecord;
use crate::db::postgres::repository::price_history_repository::{
    PRICE_HISTORY_TABLE, TraitPriceHistoryRepository,
};
use crate::error::{PipelineError, PipelineResult};
use csv_async::AsyncWriter;
use futures::TryStreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{self, File};
use tracing::info;

const HEADER: [&str; 4] = ["id", "instrument_id", "price", "trade_timestamp"];

/// Dumps `price_history` to a CSV file.
pub struct BackupExporter {
    price_history: Arc<dyn TraitPriceHistoryRepository + Send + Sync>,
}

impl BackupExporter {
    pub fn new(price_history: Arc<dyn TraitPriceHistoryRepository + Send + Sync>) -> Self {
        Self { price_history }
    }

    /// Writes every row to `path` as it is read and returns the row count.
    ///
    /// An empty table is an error so that nothing downstream pushes an empty
    /// backup. The file is only created once the first row has arrived.
    pub async fn export(&self, path: &Path) -> PipelineResult<usize> {
        let mut records = self.price_history.stream_all();
        let Some(first) = records.try_next().await? else {
            return Err(PipelineError::EmptyTable(PRICE_HISTORY_TABLE.to_string()));
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let file = File::create(path).await?;
        let mut writer = AsyncWriter::from_writer(file);
        writer.write_record(&HEADER).await?;
        writer.write_record(&csv_row(&first)).await?;
        let mut written = 1;
        while let Some(record) = records.try_next().await? {
            writer.write_record(&csv_row(&record)).await?;
            written += 1;
        }
        writer.flush().await?;

        info!("Backup complete: {} rows written to {}", written, path.display());
        Ok(written)
    }
}

fn csv_row(record: &PriceHistoryRecord) -> [String; 4] {
    [
        record.id.to_string(),
        record.instrument_id.to_string(),
        record.price.to_string(),
        record.trade_timestamp.to_rfc3339(),
    ]
}
