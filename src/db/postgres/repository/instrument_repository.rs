use crate::db::postgres::connection::PostgresConnection;
use crate::db::postgres::models::instrument::Instrument;
use async_trait::async_trait;
use sqlx::Error as SqlxError;
use std::sync::Arc;
use tracing::{debug, error};

#[async_trait]
pub trait TraitInstrumentRepository {
    /// Gets every instrument symbol, the authoritative subscription list
    async fn get_all_symbols(&self) -> Result<Vec<String>, SqlxError>;

    /// Resolves the given symbols; unknown symbols are absent from the result
    async fn find_by_symbols(&self, symbols: &[String]) -> Result<Vec<Instrument>, SqlxError>;
}

pub struct StructInstrumentRepository {
    connection: Arc<PostgresConnection>,
}

impl StructInstrumentRepository {
    pub fn new(connection: Arc<PostgresConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl TraitInstrumentRepository for StructInstrumentRepository {
    async fn get_all_symbols(&self) -> Result<Vec<String>, SqlxError> {
        let pool = self.connection.get_pool();

        let result = sqlx::query_scalar::<_, String>("SELECT symbol FROM instruments")
            .fetch_all(pool)
            .await;

        match &result {
            Ok(symbols) => debug!("Fetched {} instrument symbols", symbols.len()),
            Err(e) => error!("Error fetching instrument symbols: {}", e),
        }

        result
    }

    async fn find_by_symbols(&self, symbols: &[String]) -> Result<Vec<Instrument>, SqlxError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let pool = self.connection.get_pool();

        let result = sqlx::query_as::<_, Instrument>(
            "SELECT id, symbol FROM instruments WHERE symbol = ANY($1)",
        )
        .bind(symbols)
        .fetch_all(pool)
        .await;

        match &result {
            Ok(found) => debug!("Resolved {}/{} symbols", found.len(), symbols.len()),
            Err(e) => error!("Error resolving instrument symbols: {}", e),
        }

        result
    }
}
