use super::feed_message::{TradeTick, split_symbol};
use crate::db::redis::models::trade_record::TradeRecord;
use crate::db::redis::repository::quote_cache_repository::TraitQuoteCacheRepository;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Fans trade writes out to the cache with at most `max_in_flight` pending.
///
/// Writes beyond the limit wait for a permit. Only different symbols are
/// written concurrently; a frame carrying several trades for one symbol
/// writes its last one.
pub struct TradeWriter {
    quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
    limit: Arc<Semaphore>,
}

impl TradeWriter {
    pub fn new(
        quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            quote_cache,
            limit: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Writes the latest tick of every symbol and returns how many cache
    /// writes succeeded.
    pub async fn write_all(&self, ticks: Vec<TradeTick>) -> usize {
        let observed_at = Utc::now();
        let mut tasks = JoinSet::new();

        for tick in latest_per_symbol(ticks) {
            let permit = match self.limit.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let quote_cache = self.quote_cache.clone();
            tasks.spawn(async move {
                let _permit = permit;
                write_tick(quote_cache.as_ref(), tick, observed_at).await
            });
        }

        let mut written = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => error!("Trade write task failed: {}", e),
            }
        }
        written
    }
}

/// Keeps the last tick of each symbol in frame order.
fn latest_per_symbol(ticks: Vec<TradeTick>) -> Vec<TradeTick> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(ticks.len());
    let mut latest: Vec<TradeTick> = Vec::with_capacity(ticks.len());

    for tick in ticks {
        match positions.get(&tick.symbol) {
            Some(&index) => latest[index] = tick,
            None => {
                positions.insert(tick.symbol.clone(), latest.len());
                latest.push(tick);
            }
        }
    }
    latest
}

async fn write_tick(
    quote_cache: &(dyn TraitQuoteCacheRepository + Send + Sync),
    tick: TradeTick,
    observed_at: DateTime<Utc>,
) -> bool {
    let record = TradeRecord {
        price: tick.price,
        timestamp: tick.timestamp,
        volume: tick.volume,
        updated_at: Some(observed_at),
    };

    let record_json = match serde_json::to_string(&record) {
        Ok(json) => json,
        Err(e) => {
            error!(symbol = %tick.symbol, "Failed to encode trade record: {}", e);
            return false;
        }
    };

    match quote_cache
        .write_trade(&tick.symbol, tick.price, &record_json)
        .await
    {
        Ok(()) => {
            let (exchange, asset) = split_symbol(&tick.symbol);
            debug!("{} : {} - {}", exchange, asset, tick.price);
            true
        }
        Err(e) => {
            error!(symbol = %tick.symbol, "Failed to update quote in Redis: {}", e);
            false
        }
    }
}
