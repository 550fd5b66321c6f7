use crate::db::redis::connection::RedisConnection;
use crate::db::redis::keys::{SYMBOLS_KEY, price_key, trade_key};
use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error};

#[async_trait]
pub trait TraitQuoteCacheRepository {
    async fn ping(&self) -> RedisResult<()>;

    /// Gets the current subscription set
    async fn get_symbols(&self) -> RedisResult<HashSet<String>>;

    /// Clears the subscription set and refills it in batches, in one MULTI/EXEC
    async fn replace_symbols(&self, symbols: &[String], batch_size: usize) -> RedisResult<()>;

    /// Adds and removes members in one MULTI/EXEC
    async fn apply_symbol_diff(&self, to_add: &[String], to_remove: &[String]) -> RedisResult<()>;

    /// Writes latest price and trade record for one symbol in one round trip
    async fn write_trade(&self, symbol: &str, price: f64, record_json: &str) -> RedisResult<()>;

    /// Pipelined read of the raw trade records, in input order
    async fn get_trades(&self, symbols: &[String]) -> RedisResult<Vec<Option<String>>>;
}

pub struct StructQuoteCacheRepository {
    connection: Arc<RedisConnection>,
    trade_ttl_seconds: u64,
}

impl StructQuoteCacheRepository {
    pub fn new(connection: Arc<RedisConnection>, trade_ttl_seconds: u64) -> Self {
        Self {
            connection,
            trade_ttl_seconds,
        }
    }
}

#[async_trait]
impl TraitQuoteCacheRepository for StructQuoteCacheRepository {
    async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.connection.get_manager();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get_symbols(&self) -> RedisResult<HashSet<String>> {
        let mut conn = self.connection.get_manager();

        let result: RedisResult<HashSet<String>> = conn.smembers(SYMBOLS_KEY).await;

        match &result {
            Ok(symbols) => debug!("Fetched {} symbols from Redis", symbols.len()),
            Err(e) => error!("Failed to fetch symbols from Redis: {}", e),
        }

        result
    }

    async fn replace_symbols(&self, symbols: &[String], batch_size: usize) -> RedisResult<()> {
        let mut conn = self.connection.get_manager();

        let mut pipe = redis::pipe();
        pipe.atomic().del(SYMBOLS_KEY).ignore();
        for batch in symbols.chunks(batch_size.max(1)) {
            pipe.sadd(SYMBOLS_KEY, batch).ignore();
        }

        let _: () = pipe.query_async(&mut conn).await?;
        debug!("Replaced subscription set with {} symbols", symbols.len());
        Ok(())
    }

    async fn apply_symbol_diff(&self, to_add: &[String], to_remove: &[String]) -> RedisResult<()> {
        if to_add.is_empty() && to_remove.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.get_manager();

        let mut pipe = redis::pipe();
        pipe.atomic();
        if !to_add.is_empty() {
            pipe.sadd(SYMBOLS_KEY, to_add).ignore();
        }
        if !to_remove.is_empty() {
            pipe.srem(SYMBOLS_KEY, to_remove).ignore();
        }

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn write_trade(&self, symbol: &str, price: f64, record_json: &str) -> RedisResult<()> {
        let mut conn = self.connection.get_manager();

        let _: () = redis::pipe()
            .set(price_key(symbol), price)
            .ignore()
            .set_ex(trade_key(symbol), record_json, self.trade_ttl_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn get_trades(&self, symbols: &[String]) -> RedisResult<Vec<Option<String>>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.get_manager();

        let mut pipe = redis::pipe();
        for symbol in symbols {
            pipe.get(trade_key(symbol));
        }

        pipe.query_async(&mut conn).await
    }
}
