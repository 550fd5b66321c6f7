mod api;
mod app_state;
mod db;
mod env_config;
mod error;
mod layers;
mod logger;
mod services;
mod utils;

#[cfg(test)]
mod test_support;

use app_state::models::AppState;
use axum::{Router, routing::get};
use clap::{Parser, Subcommand};
use db::postgres::listener::StructInstrumentChangeListener;
use db::postgres::postgres_service::PostgresService;
use db::redis::connection::RedisConnection;
use db::redis::repository::quote_cache_repository::{
    StructQuoteCacheRepository, TraitQuoteCacheRepository,
};
use env_config::models::{app_config::AppConfig, app_env::AppEnv, app_setting::AppSettings};
use layers::{create_cors, create_trace};
use services::fetcher::batch_fetcher::{BatchFetcher, FetcherOptions};
use services::maintenance::{backup::BackupExporter, cleaner::RetentionCleaner};
use services::orchestrator::{
    backup_job::BackupJob,
    runner::{Orchestrator, run_instrument_listener},
    schedule::Scheduler,
    supervisor::FetcherSupervisor,
};
use services::streamer::client::{StreamerOptions, StreamingClient};
use services::symbols::synchronizer::SymbolSynchronizer;
use std::{net::SocketAddr, path::PathBuf, process::ExitCode, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "quote-pipeline", version, about = "Market quote ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run scheduled jobs and keep the subscription set in sync with instruments
    Orchestrator,
    /// Stream live trades into Redis
    Streamer,
    /// Snapshot cached trades into price_history inside the fetcher window
    Fetcher,
    /// Export price_history to CSV
    Backup {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Truncate and vacuum a table if it has rows
    Clean { table: String },
    /// Replace the subscription set with every instrument symbol
    Seed,
    /// Apply only the difference between instruments and the subscription set
    Reconcile,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Orchestrator => "orchestrator",
            Command::Streamer => "streamer",
            Command::Fetcher => "fetcher",
            Command::Backup { .. } => "backup",
            Command::Clean { .. } => "clean",
            Command::Seed => "seed",
            Command::Reconcile => "reconcile",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // TLS provider for wss:// feeds
    let _ = rustls::crypto::ring::default_provider().install_default();

    let settings: Arc<AppSettings> = Arc::new(initialize_application());
    let run_id = Uuid::new_v4();
    info!(%run_id, role = cli.command.name(), "Starting quote pipeline");

    match cli.command {
        Command::Orchestrator => {
            run_orchestrator(settings).await;
            ExitCode::SUCCESS
        }
        Command::Streamer => run_streamer(settings).await,
        Command::Fetcher => {
            run_fetcher(settings).await;
            ExitCode::SUCCESS
        }
        Command::Backup { output } => run_backup(settings, output).await,
        Command::Clean { table } => run_clean(settings, &table).await,
        Command::Seed => run_symbol_sync(settings, true).await,
        Command::Reconcile => run_symbol_sync(settings, false).await,
    }
}

/// Loads settings and installs logging
fn initialize_application() -> AppSettings {
    let environment = AppEnv::new();
    let config = AppConfig::new(&environment.env);
    let app_settings = AppSettings {
        app_config: config,
        app_env: environment,
    };

    if let Err(e) = logger::init_logger(
        &app_settings.app_config.log.level,
        &app_settings.app_config.log.format,
        app_settings.app_env.is_local(),
    ) {
        panic!("Failed to initialize logger: {}", e);
    }

    info!("Current environment: {}", app_settings.app_env.env);
    if app_settings.app_env.is_local() {
        info!("Running in local development mode");
        debug!("Configuration details: {:#?}", app_settings);
    } else {
        info!("Running in production mode");
    }

    app_settings
}

async fn connect_postgres(settings: &Arc<AppSettings>) -> Arc<PostgresService> {
    match PostgresService::new(settings).await {
        Ok(service) => Arc::new(service),
        Err(err) => {
            error!("Failed to connect to PostgreSQL: {}", err);
            panic!("Cannot continue without PostgreSQL connection");
        }
    }
}

async fn connect_redis(
    settings: &Arc<AppSettings>,
) -> Arc<dyn TraitQuoteCacheRepository + Send + Sync> {
    match RedisConnection::new(settings.clone()).await {
        Ok(connection) => Arc::new(StructQuoteCacheRepository::new(
            Arc::new(connection),
            settings.app_config.redis.trade_ttl_seconds,
        )),
        Err(err) => {
            error!("Failed to connect to Redis: {}", err);
            panic!("Cannot continue without Redis connection");
        }
    }
}

fn build_synchronizer(
    settings: &AppSettings,
    postgres: &PostgresService,
    quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
) -> SymbolSynchronizer {
    SymbolSynchronizer::new(
        postgres.repository_instrument.clone(),
        quote_cache,
        settings.app_config.redis.symbols_batch_size,
    )
}

fn build_fetcher(
    settings: &AppSettings,
    postgres: &PostgresService,
    quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
) -> BatchFetcher {
    BatchFetcher::new(
        quote_cache,
        postgres.repository_instrument.clone(),
        postgres.repository_price_history.clone(),
        FetcherOptions::from(&settings.app_config.fetcher),
    )
}

async fn run_orchestrator(settings: Arc<AppSettings>) {
    let postgres = connect_postgres(&settings).await;
    let quote_cache = connect_redis(&settings).await;
    let config = &settings.app_config;

    let synchronizer = Arc::new(build_synchronizer(&settings, &postgres, quote_cache.clone()));
    if let Err(err) = synchronizer.seed().await {
        error!("Initial symbol seed failed: {}", err);
    }

    let listener = StructInstrumentChangeListener::new(
        postgres.connection.clone(),
        config.orchestrator.notify_channel.clone(),
    );
    tokio::spawn(run_instrument_listener(
        listener,
        synchronizer,
        Duration::from_secs(config.orchestrator.listener_retry_seconds),
    ));

    if config.orchestrator.health_enabled {
        let app_state = Arc::new(AppState::new(postgres.clone(), quote_cache.clone()));
        let server_address = parse_server_address(&settings);
        tokio::spawn(start_http_server(
            create_application_router(app_state),
            server_address,
        ));
    }

    let backup = if config.backup.enabled {
        let program = match std::env::current_exe() {
            Ok(path) => path,
            Err(err) => panic!("Cannot locate own executable for backup jobs: {}", err),
        };
        Some(BackupJob::new(program, &config.backup))
    } else {
        None
    };

    let fetcher = Arc::new(build_fetcher(&settings, &postgres, quote_cache));
    let orchestrator = Orchestrator::new(
        Scheduler::from_config(config),
        FetcherSupervisor::new(fetcher),
        RetentionCleaner::new(postgres.repository_maintenance.clone()),
        backup,
        Duration::from_secs(config.orchestrator.poll_seconds),
    );

    info!("Orchestrator started");
    orchestrator.run().await;
}

async fn run_streamer(settings: Arc<AppSettings>) -> ExitCode {
    let Some(api_key) = settings.app_env.feed_api_key.clone() else {
        error!("ENV -> FEED_API_KEY is not set");
        return ExitCode::FAILURE;
    };

    let quote_cache = connect_redis(&settings).await;
    let config = &settings.app_config.streamer;
    let url = format!("{}?token={}", config.url, api_key);

    let client = StreamingClient::new(url, quote_cache, StreamerOptions::from(config));
    client.run().await;
    ExitCode::SUCCESS
}

async fn run_fetcher(settings: Arc<AppSettings>) {
    let postgres = connect_postgres(&settings).await;
    let quote_cache = connect_redis(&settings).await;

    let fetcher = build_fetcher(&settings, &postgres, quote_cache);
    fetcher.run_forever().await;
}

async fn run_backup(settings: Arc<AppSettings>, output: Option<PathBuf>) -> ExitCode {
    let postgres = connect_postgres(&settings).await;
    let path = output.unwrap_or_else(|| settings.app_config.backup.output_path.clone());

    match BackupExporter::new(postgres.repository_price_history.clone())
        .export(&path)
        .await
    {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Backup failed: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run_clean(settings: Arc<AppSettings>, table: &str) -> ExitCode {
    let postgres = connect_postgres(&settings).await;

    match RetentionCleaner::new(postgres.repository_maintenance.clone())
        .clean(table)
        .await
    {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(table, "Cleanup failed: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run_symbol_sync(settings: Arc<AppSettings>, full: bool) -> ExitCode {
    let postgres = connect_postgres(&settings).await;
    let quote_cache = connect_redis(&settings).await;
    let synchronizer = build_synchronizer(&settings, &postgres, quote_cache);

    let result = if full {
        synchronizer.seed().await.map(|_| ())
    } else {
        synchronizer.reconcile().await.map(|_| ())
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Symbol sync failed: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn parse_server_address(settings: &AppSettings) -> SocketAddr {
    let raw = format!(
        "{}:{}",
        settings.app_env.server_address, settings.app_env.server_port,
    );
    match raw.parse() {
        Ok(address) => address,
        Err(err) => panic!("Invalid server address configuration {}: {}", raw, err),
    }
}

/// Health routes served by the orchestrator
fn create_application_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api-health", get(api::health_api))
        .route("/db-health", get(api::health_db))
        .layer(axum::Extension(app_state))
        .layer(create_cors())
        .layer(create_trace())
}

async fn start_http_server(app: Router, addr: SocketAddr) {
    info!("Starting HTTP server on {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed to bind to address {}: {}", addr, err);
            panic!("Cannot start server: {}", err);
        }
    };

    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
    }
}
