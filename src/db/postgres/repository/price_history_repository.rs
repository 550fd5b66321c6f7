use crate::db::postgres::connection::PostgresConnection;
use crate::db::postgres::models::price_history::{NewPriceHistory, PriceHistoryRecord};
use async_trait::async_trait;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use sqlx::postgres::PgQueryResult;
use sqlx::{Error as SqlxError, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::{debug, error};

pub const PRICE_HISTORY_TABLE: &str = "price_history";

const SELECT_ALL_ORDERED: &str =
    "SELECT id, instrument_id, price, trade_timestamp FROM price_history ORDER BY id";

// Keeps a single INSERT under the 65535 bind parameter limit.
const INSERT_CHUNK_ROWS: usize = 10_000;

#[async_trait]
pub trait TraitPriceHistoryRepository {
    /// Appends all rows with one multi-row INSERT per chunk
    async fn insert_batch(&self, rows: &[NewPriceHistory]) -> Result<u64, SqlxError>;

    /// Streams the whole table ordered by id
    fn stream_all(&self) -> BoxStream<'_, Result<PriceHistoryRecord, SqlxError>>;
}

pub struct StructPriceHistoryRepository {
    connection: Arc<PostgresConnection>,
}

impl StructPriceHistoryRepository {
    pub fn new(connection: Arc<PostgresConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl TraitPriceHistoryRepository for StructPriceHistoryRepository {
    async fn insert_batch(&self, rows: &[NewPriceHistory]) -> Result<u64, SqlxError> {
        let pool = self.connection.get_pool();
        let mut inserted = 0;

        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (instrument_id, price, trade_timestamp) ",
                PRICE_HISTORY_TABLE
            ));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.instrument_id)
                    .push_bind(row.price)
                    .push_bind(row.trade_timestamp);
            });

            let result: Result<PgQueryResult, SqlxError> = builder.build().execute(pool).await;
            match result {
                Ok(pg_result) => inserted += pg_result.rows_affected(),
                Err(e) => {
                    error!("Error inserting {} price history rows: {}", chunk.len(), e);
                    return Err(e);
                }
            }
        }

        debug!("Inserted {} price history rows", inserted);
        Ok(inserted)
    }

    fn stream_all(&self) -> BoxStream<'_, Result<PriceHistoryRecord, SqlxError>> {
        let pool = self.connection.get_pool();

        Box::pin(
            sqlx::query_as::<_, PriceHistoryRecord>(SELECT_ALL_ORDERED)
                .fetch(pool)
                .inspect_err(|e| error!("Error streaming price history: {}", e)),
        )
    }
}
