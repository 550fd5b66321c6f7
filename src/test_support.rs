//! In-memory stand-ins for the Redis and PostgreSQL repositories.

use crate::db::postgres::models::instrument::Instrument;
use crate::db::postgres::models::price_history::{NewPriceHistory, PriceHistoryRecord};
use crate::db::postgres::repository::instrument_repository::TraitInstrumentRepository;
use crate::db::postgres::repository::maintenance_repository::TraitMaintenanceRepository;
use crate::db::postgres::repository::price_history_repository::TraitPriceHistoryRepository;
use crate::db::redis::repository::quote_cache_repository::TraitQuoteCacheRepository;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use redis::{ErrorKind, RedisError, RedisResult};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

fn injected_redis_error() -> RedisError {
    RedisError::from((ErrorKind::IoError, "injected failure"))
}

#[derive(Default)]
pub struct InMemoryQuoteCache {
    pub symbols: Mutex<HashSet<String>>,
    pub prices: Mutex<HashMap<String, f64>>,
    pub trades: Mutex<HashMap<String, String>>,
    pub writes: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    /// Trade writes carrying one of these prices sleep first
    pub write_delays: Mutex<Vec<(f64, Duration)>>,
}

impl InMemoryQuoteCache {
    pub fn delay_price(&self, price: f64, delay: Duration) {
        self.write_delays.lock().unwrap().push((price, delay));
    }

    pub fn with_symbols(symbols: &[&str]) -> Self {
        let cache = Self::default();
        cache
            .symbols
            .lock()
            .unwrap()
            .extend(symbols.iter().map(|s| s.to_string()));
        cache
    }

    pub fn symbol_set(&self) -> HashSet<String> {
        self.symbols.lock().unwrap().clone()
    }

    pub fn put_trade(&self, symbol: &str, raw: &str) {
        self.trades
            .lock()
            .unwrap()
            .insert(symbol.to_string(), raw.to_string());
    }
}

#[async_trait]
impl TraitQuoteCacheRepository for InMemoryQuoteCache {
    async fn ping(&self) -> RedisResult<()> {
        Ok(())
    }

    async fn get_symbols(&self) -> RedisResult<HashSet<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected_redis_error());
        }
        Ok(self.symbol_set())
    }

    async fn replace_symbols(&self, symbols: &[String], _batch_size: usize) -> RedisResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected_redis_error());
        }
        *self.symbols.lock().unwrap() = symbols.iter().cloned().collect();
        Ok(())
    }

    async fn apply_symbol_diff(&self, to_add: &[String], to_remove: &[String]) -> RedisResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected_redis_error());
        }
        let mut symbols = self.symbols.lock().unwrap();
        symbols.extend(to_add.iter().cloned());
        for symbol in to_remove {
            symbols.remove(symbol);
        }
        Ok(())
    }

    async fn write_trade(&self, symbol: &str, price: f64, record_json: &str) -> RedisResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected_redis_error());
        }
        let delay = self
            .write_delays
            .lock()
            .unwrap()
            .iter()
            .find(|(delayed, _)| *delayed == price)
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
        self.put_trade(symbol, record_json);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_trades(&self, symbols: &[String]) -> RedisResult<Vec<Option<String>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected_redis_error());
        }
        let trades = self.trades.lock().unwrap();
        Ok(symbols.iter().map(|s| trades.get(s).cloned()).collect())
    }
}

#[derive(Default)]
pub struct FakeInstrumentRepository {
    pub instruments: Mutex<Vec<Instrument>>,
    pub fail: AtomicBool,
}

impl FakeInstrumentRepository {
    pub fn with(instruments: &[(i32, &str)]) -> Self {
        let repo = Self::default();
        *repo.instruments.lock().unwrap() = instruments
            .iter()
            .map(|(id, symbol)| Instrument {
                id: *id,
                symbol: symbol.to_string(),
            })
            .collect();
        repo
    }
}

#[async_trait]
impl TraitInstrumentRepository for FakeInstrumentRepository {
    async fn get_all_symbols(&self) -> Result<Vec<String>, sqlx::Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(self
            .instruments
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.symbol.clone())
            .collect())
    }

    async fn find_by_symbols(&self, symbols: &[String]) -> Result<Vec<Instrument>, sqlx::Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(self
            .instruments
            .lock()
            .unwrap()
            .iter()
            .filter(|i| symbols.contains(&i.symbol))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakePriceHistoryRepository {
    pub inserted: Mutex<Vec<NewPriceHistory>>,
    pub stored: Mutex<Vec<PriceHistoryRecord>>,
    pub insert_calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl TraitPriceHistoryRepository for FakePriceHistoryRepository {
    async fn insert_batch(&self, rows: &[NewPriceHistory]) -> Result<u64, sqlx::Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.inserted.lock().unwrap().extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    /// Yields the stored rows, then an error when `fail` is set.
    fn stream_all(&self) -> BoxStream<'_, Result<PriceHistoryRecord, sqlx::Error>> {
        let mut rows: Vec<Result<PriceHistoryRecord, sqlx::Error>> =
            self.stored.lock().unwrap().iter().cloned().map(Ok).collect();
        if self.fail.load(Ordering::SeqCst) {
            rows.push(Err(sqlx::Error::PoolTimedOut));
        }
        stream::iter(rows).boxed()
    }
}

/// Tracks a row count per table.
#[derive(Default)]
pub struct FakeMaintenanceRepository {
    pub rows: Mutex<HashMap<String, usize>>,
    pub emptiness_checks: AtomicUsize,
    pub truncations: AtomicUsize,
}

impl FakeMaintenanceRepository {
    pub fn with_rows(table: &str, rows: usize) -> Self {
        let repo = Self::default();
        repo.rows.lock().unwrap().insert(table.to_string(), rows);
        repo
    }
}

#[async_trait]
impl TraitMaintenanceRepository for FakeMaintenanceRepository {
    async fn table_not_empty(&self, table: &str) -> Result<bool, sqlx::Error> {
        self.emptiness_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().unwrap().get(table).copied().unwrap_or(0) > 0)
    }

    async fn truncate_and_vacuum(&self, table: &str) -> Result<(), sqlx::Error> {
        self.truncations.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().insert(table.to_string(), 0);
        Ok(())
    }
}
