use crate::db::postgres::repository::instrument_repository::TraitInstrumentRepository;
use crate::db::redis::repository::quote_cache_repository::TraitQuoteCacheRepository;
use crate::error::PipelineResult;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one incremental sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
}

/// Derives the cache subscription set from the `instruments` table.
///
/// Both operations are idempotent and may overlap; whichever finishes last
/// decides the set. On any error the set is left as it was.
pub struct SymbolSynchronizer {
    instruments: Arc<dyn TraitInstrumentRepository + Send + Sync>,
    quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
    batch_size: usize,
}

impl SymbolSynchronizer {
    pub fn new(
        instruments: Arc<dyn TraitInstrumentRepository + Send + Sync>,
        quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
        batch_size: usize,
    ) -> Self {
        Self {
            instruments,
            quote_cache,
            batch_size,
        }
    }

    /// Full replace of the subscription set. Returns the number of symbols written.
    pub async fn seed(&self) -> PipelineResult<usize> {
        let symbols = self.instruments.get_all_symbols().await?;

        if symbols.is_empty() {
            warn!("No instrument symbols found; subscription set will be empty");
        }

        self.quote_cache
            .replace_symbols(&symbols, self.batch_size)
            .await?;

        info!("Initialized Redis with {} symbols", symbols.len());
        Ok(symbols.len())
    }

    /// Applies only the difference between the store and the cache.
    pub async fn reconcile(&self) -> PipelineResult<SyncReport> {
        let current: HashSet<String> = self
            .instruments
            .get_all_symbols()
            .await?
            .into_iter()
            .collect();
        let existing = self.quote_cache.get_symbols().await?;

        let (to_add, to_remove) = symbol_diff(&current, &existing);

        if to_add.is_empty() && to_remove.is_empty() {
            info!("Redis already in sync ({} symbols)", existing.len());
            return Ok(SyncReport::default());
        }

        self.quote_cache
            .apply_symbol_diff(&to_add, &to_remove)
            .await?;

        info!(
            added = to_add.len(),
            removed = to_remove.len(),
            "Subscription set reconciled"
        );
        Ok(SyncReport {
            added: to_add.len(),
            removed: to_remove.len(),
        })
    }
}

/// Returns `(wanted - have, have - wanted)`, each sorted for stable logs.
pub fn symbol_diff(
    wanted: &HashSet<String>,
    have: &HashSet<String>,
) -> (Vec<String>, Vec<String>) {
    let mut to_add: Vec<String> = wanted.difference(have).cloned().collect();
    let mut to_remove: Vec<String> = have.difference(wanted).cloned().collect();
    to_add.sort();
    to_remove.sort();
    (to_add, to_remove)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeInstrumentRepository, InMemoryQuoteCache};
    use std::sync::atomic::Ordering;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn synchronizer(
        store: &Arc<FakeInstrumentRepository>,
        cache: &Arc<InMemoryQuoteCache>,
    ) -> SymbolSynchronizer {
        SymbolSynchronizer::new(store.clone(), cache.clone(), 2)
    }

    #[tokio::test]
    async fn test_reconcile_makes_cache_equal_store() {
        let store = Arc::new(FakeInstrumentRepository::with(&[
            (1, "BINANCE:BTCUSDT"),
            (2, "BINANCE:ETHUSDT"),
            (3, "AAPL"),
        ]));
        let cache = Arc::new(InMemoryQuoteCache::with_symbols(&[
            "AAPL",
            "OANDA:EUR_USD",
            "MSFT",
        ]));

        let report = synchronizer(&store, &cache).reconcile().await.unwrap();

        assert_eq!(report, SyncReport { added: 2, removed: 2 });
        assert_eq!(
            cache.symbol_set(),
            set(&["BINANCE:BTCUSDT", "BINANCE:ETHUSDT", "AAPL"])
        );
    }

    #[tokio::test]
    async fn test_reconcile_in_sync_is_noop() {
        let store = Arc::new(FakeInstrumentRepository::with(&[(1, "AAPL")]));
        let cache = Arc::new(InMemoryQuoteCache::with_symbols(&["AAPL"]));

        let report = synchronizer(&store, &cache).reconcile().await.unwrap();

        assert_eq!(report, SyncReport::default());
        assert_eq!(cache.symbol_set(), set(&["AAPL"]));
    }

    #[tokio::test]
    async fn test_reconcile_store_failure_leaves_set_unchanged() {
        let store = Arc::new(FakeInstrumentRepository::with(&[(1, "AAPL")]));
        store.fail.store(true, Ordering::SeqCst);
        let cache = Arc::new(InMemoryQuoteCache::with_symbols(&["MSFT"]));

        assert!(synchronizer(&store, &cache).reconcile().await.is_err());
        assert_eq!(cache.symbol_set(), set(&["MSFT"]));
    }

    #[tokio::test]
    async fn test_seed_replaces_whole_set() {
        let store = Arc::new(FakeInstrumentRepository::with(&[
            (1, "A"),
            (2, "B"),
            (3, "C"),
        ]));
        let cache = Arc::new(InMemoryQuoteCache::with_symbols(&["OLD"]));

        let count = synchronizer(&store, &cache).seed().await.unwrap();

        assert_eq!(count, 3);
        assert_eq!(cache.symbol_set(), set(&["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_seed_with_empty_store_clears_set() {
        let store = Arc::new(FakeInstrumentRepository::default());
        let cache = Arc::new(InMemoryQuoteCache::with_symbols(&["OLD"]));

        let count = synchronizer(&store, &cache).seed().await.unwrap();

        assert_eq!(count, 0);
        assert!(cache.symbol_set().is_empty());
    }

    #[tokio::test]
    async fn test_seed_cache_failure_keeps_previous_set() {
        let store = Arc::new(FakeInstrumentRepository::with(&[(1, "A")]));
        let cache = Arc::new(InMemoryQuoteCache::with_symbols(&["OLD"]));
        cache.fail_writes.store(true, Ordering::SeqCst);

        assert!(synchronizer(&store, &cache).seed().await.is_err());
        assert_eq!(cache.symbol_set(), set(&["OLD"]));
    }

    #[test]
    fn test_symbol_diff() {
        let (add, remove) = symbol_diff(&set(&["A", "B"]), &set(&["B", "C"]));
        assert_eq!(add, vec!["A".to_string()]);
        assert_eq!(remove, vec!["C".to_string()]);
    }
}
