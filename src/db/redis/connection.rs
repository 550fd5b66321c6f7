use crate::env_config::models::app_setting::AppSettings;
use redis::RedisResult;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Multiplexed Redis connection that reconnects on its own after drops.
#[derive(Clone)]
pub struct RedisConnection {
    manager: ConnectionManager,
}

impl RedisConnection {
    pub async fn new(settings: Arc<AppSettings>) -> RedisResult<Self> {
        info!("Initializing Redis connection...");

        let client = redis::Client::open(settings.app_env.redis_url.as_str())?;
        let manager = ConnectionManager::new(client).await?;

        // Test connection
        debug!("Executing PING on Redis");
        let mut conn = manager.clone();
        let ping: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match ping {
            Ok(_) => info!("Redis connection successful"),
            Err(e) => {
                error!("Failed to connect to Redis: {}", e);
                return Err(e);
            }
        }

        Ok(Self { manager })
    }

    pub fn get_manager(&self) -> ConnectionManager {
        self.manager.clone()
    }
}
