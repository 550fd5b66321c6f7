use crate::db::postgres::repository::{
    health_check_repository::{StructHealthCheckRepository, TraitHealthCheckRepository},
    instrument_repository::{StructInstrumentRepository, TraitInstrumentRepository},
    maintenance_repository::{StructMaintenanceRepository, TraitMaintenanceRepository},
    price_history_repository::{StructPriceHistoryRepository, TraitPriceHistoryRepository},
};
use crate::db::postgres::connection::PostgresConnection;
use crate::env_config::models::app_setting::AppSettings;
use std::sync::Arc;
use tracing::{error, info};

pub struct PostgresService {
    // Connection
    pub connection: Arc<PostgresConnection>,

    // Repositories
    pub repository_health_check: Arc<dyn TraitHealthCheckRepository + Send + Sync>,
    pub repository_instrument: Arc<dyn TraitInstrumentRepository + Send + Sync>,
    pub repository_price_history: Arc<dyn TraitPriceHistoryRepository + Send + Sync>,
    pub repository_maintenance: Arc<dyn TraitMaintenanceRepository + Send + Sync>,
}

impl PostgresService {
    pub async fn new(settings: &Arc<AppSettings>) -> Result<Self, sqlx::Error> {
        info!("Initializing PostgreSQL service components");

        let postgres_connection = match PostgresConnection::new(settings.clone()).await {
            Ok(conn) => {
                info!("PostgreSQL connection established successfully");
                Arc::new(conn)
            }
            Err(e) => {
                error!("Failed to establish PostgreSQL connection: {}", e);
                return Err(e);
            }
        };

        info!("Initializing repositories");

        let health_check_repository = Arc::new(StructHealthCheckRepository::new(
            postgres_connection.clone(),
        )) as Arc<dyn TraitHealthCheckRepository + Send + Sync>;

        let instrument_repository = Arc::new(StructInstrumentRepository::new(
            postgres_connection.clone(),
        )) as Arc<dyn TraitInstrumentRepository + Send + Sync>;

        let price_history_repository = Arc::new(StructPriceHistoryRepository::new(
            postgres_connection.clone(),
        )) as Arc<dyn TraitPriceHistoryRepository + Send + Sync>;

        let maintenance_repository = Arc::new(StructMaintenanceRepository::new(
            postgres_connection.clone(),
        )) as Arc<dyn TraitMaintenanceRepository + Send + Sync>;

        info!("PostgreSQL service initialized successfully");
        Ok(Self {
            connection: postgres_connection,
            repository_health_check: health_check_repository,
            repository_instrument: instrument_repository,
            repository_price_history: price_history_repository,
            repository_maintenance: maintenance_repository,
        })
    }
}
