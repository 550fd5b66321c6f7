use crate::db::postgres::models::price_history::NewPriceHistory;
use crate::db::postgres::repository::instrument_repository::TraitInstrumentRepository;
use crate::db::postgres::repository::price_history_repository::TraitPriceHistoryRepository;
use crate::db::redis::models::trade_record::TradeRecord;
use crate::db::redis::repository::quote_cache_repository::TraitQuoteCacheRepository;
use crate::env_config::models::app_config::FetcherConfig;
use crate::error::PipelineResult;
use crate::utils::time_window::TimeWindow;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub interval: Duration,
    pub window: TimeWindow,
    pub pause_check: Duration,
    pub skip_unchanged_trades: bool,
}

impl From<&FetcherConfig> for FetcherOptions {
    fn from(config: &FetcherConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_seconds),
            window: config.window,
            pause_check: Duration::from_secs(config.pause_check_seconds),
            skip_unchanged_trades: config.skip_unchanged_trades,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub inserted: u64,
    pub unknown_symbols: usize,
    pub unchanged: usize,
}

struct Observed {
    symbol: String,
    price: f64,
    event_millis: i64,
    trade_time: DateTime<Utc>,
}

/// Snapshots the latest cached trade of every subscribed symbol into
/// `price_history`, once per interval.
pub struct BatchFetcher {
    quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
    instruments: Arc<dyn TraitInstrumentRepository + Send + Sync>,
    price_history: Arc<dyn TraitPriceHistoryRepository + Send + Sync>,
    options: FetcherOptions,
    /// Event time of the last inserted record per symbol
    last_inserted: Mutex<HashMap<String, i64>>,
}

impl BatchFetcher {
    pub fn new(
        quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
        instruments: Arc<dyn TraitInstrumentRepository + Send + Sync>,
        price_history: Arc<dyn TraitPriceHistoryRepository + Send + Sync>,
        options: FetcherOptions,
    ) -> Self {
        Self {
            quote_cache,
            instruments,
            price_history,
            options,
            last_inserted: Mutex::new(HashMap::new()),
        }
    }

    /// One read of the cache followed by a single bulk insert.
    pub async fn run_cycle(&self) -> PipelineResult<CycleReport> {
        let mut symbols: Vec<String> = self.quote_cache.get_symbols().await?.into_iter().collect();
        if symbols.is_empty() {
            debug!("No subscribed symbols, nothing to fetch");
            return Ok(CycleReport::default());
        }
        symbols.sort();

        let raw_records = self.quote_cache.get_trades(&symbols).await?;
        let observed: Vec<Observed> = symbols
            .into_iter()
            .zip(raw_records)
            .filter_map(|(symbol, raw)| decode_record(symbol, raw?))
            .collect();

        if observed.is_empty() {
            debug!("No trade records in cache");
            return Ok(CycleReport::default());
        }

        let wanted: Vec<String> = observed.iter().map(|o| o.symbol.clone()).collect();
        let ids: HashMap<String, i32> = self
            .instruments
            .find_by_symbols(&wanted)
            .await?
            .into_iter()
            .map(|instrument| (instrument.symbol, instrument.id))
            .collect();

        let mut report = CycleReport::default();
        let mut rows = Vec::with_capacity(observed.len());
        let mut inserted_marks = Vec::with_capacity(observed.len());
        {
            let last_inserted = self.last_inserted.lock().unwrap_or_else(|e| e.into_inner());
            for item in observed {
                let Some(&instrument_id) = ids.get(&item.symbol) else {
                    warn!(symbol = %item.symbol, "Instrument not found in database");
                    report.unknown_symbols += 1;
                    continue;
                };

                if self.options.skip_unchanged_trades
                    && last_inserted.get(&item.symbol) == Some(&item.event_millis)
                {
                    report.unchanged += 1;
                    continue;
                }

                rows.push(NewPriceHistory {
                    instrument_id,
                    price: item.price,
                    trade_timestamp: item.trade_time,
                });
                inserted_marks.push((item.symbol, item.event_millis));
            }
        }

        if rows.is_empty() {
            return Ok(report);
        }

        report.inserted = self.price_history.insert_batch(&rows).await?;
        info!("Saved {} records to database", report.inserted);

        if self.options.skip_unchanged_trades {
            let mut last_inserted = self.last_inserted.lock().unwrap_or_else(|e| e.into_inner());
            last_inserted.extend(inserted_marks);
        }

        Ok(report)
    }

    /// Runs cycles until the window closes. Used under the orchestrator.
    pub async fn run_within_window(&self) {
        info!(window = %self.options.window, "Fetcher started");
        while self.options.window.contains(Utc::now().time()) {
            self.timed_cycle().await;
        }
        info!(window = %self.options.window, "Fetcher window closed, stopping");
    }

    /// Standalone mode: cycles inside the window, idles outside it.
    pub async fn run_forever(&self) {
        let mut paused = false;
        loop {
            if self.options.window.contains(Utc::now().time()) {
                if paused {
                    info!(window = %self.options.window, "Fetcher resuming");
                    paused = false;
                }
                self.timed_cycle().await;
            } else {
                if !paused {
                    info!(window = %self.options.window, "Outside fetcher window, pausing");
                    paused = true;
                }
                time::sleep(self.options.pause_check).await;
            }
        }
    }

    /// Runs one cycle and sleeps off the rest of the interval.
    async fn timed_cycle(&self) {
        let started = Instant::now();

        if let Err(e) = self.run_cycle().await {
            error!("Fetch cycle failed: {}", e);
        }

        let elapsed = started.elapsed();
        match self.options.interval.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => time::sleep(remaining).await,
            _ => warn!(
                "Fetch cycle took {:.2}s, longer than the {}s interval",
                elapsed.as_secs_f64(),
                self.options.interval.as_secs()
            ),
        }
    }
}

fn decode_record(symbol: String, raw: String) -> Option<Observed> {
    let record: TradeRecord = match serde_json::from_str(&raw) {
        Ok(record) => record,
        Err(e) => {
            warn!(symbol = %symbol, "Malformed trade record: {}", e);
            return None;
        }
    };

    let (Some(event_millis), Some(trade_time)) = (record.timestamp, record.trade_time()) else {
        warn!(symbol = %symbol, "Trade record has no usable timestamp");
        return None;
    };

    Some(Observed {
        symbol,
        price: record.price,
        event_millis,
        trade_time,
    })
}
