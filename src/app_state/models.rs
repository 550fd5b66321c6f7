use crate::db::postgres::postgres_service::PostgresService;
use crate::db::redis::repository::quote_cache_repository::TraitQuoteCacheRepository;
use std::sync::Arc;

pub struct AppState {
    pub postgres_service: Arc<PostgresService>,
    pub quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
}

impl AppState {
    pub fn new(
        postgres_service: Arc<PostgresService>,
        quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
    ) -> Self {
        Self {
            postgres_service,
            quote_cache,
        }
    }
}
