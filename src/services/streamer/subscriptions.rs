use super::feed_message::ControlMessage;
use crate::db::redis::repository::quote_cache_repository::TraitQuoteCacheRepository;
use crate::services::symbols::synchronizer::symbol_diff;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Symbols the current session believes it is subscribed to.
pub type SubscribedSet = Arc<Mutex<HashSet<String>>>;

/// Diffs `wanted` against the tracked set and queues control frames.
///
/// A symbol becomes tracked only once its subscribe frame is queued. An
/// unsubscribed symbol stops being tracked even if queuing fails.
pub async fn sync_subscriptions(
    wanted: &HashSet<String>,
    subscribed: &SubscribedSet,
    outbound: &mpsc::UnboundedSender<ControlMessage>,
) -> (usize, usize) {
    let mut tracked = subscribed.lock().await;
    let (to_add, to_remove) = symbol_diff(wanted, &tracked);

    let mut added = 0;
    for symbol in to_add {
        match outbound.send(ControlMessage::Subscribe {
            symbol: symbol.clone(),
        }) {
            Ok(()) => {
                info!("[WS] Subscribed: {}", symbol);
                tracked.insert(symbol);
                added += 1;
            }
            Err(e) => warn!("[WS] Failed to subscribe {}: {}", e.0.symbol(), e),
        }
    }

    let removed = to_remove.len();
    for symbol in to_remove {
        if let Err(e) = outbound.send(ControlMessage::Unsubscribe {
            symbol: symbol.clone(),
        }) {
            warn!("[WS] Failed to unsubscribe {}: {}", e.0.symbol(), e);
        } else {
            info!("[WS] Unsubscribed: {}", symbol);
        }
        tracked.remove(&symbol);
    }

    (added, removed)
}

/// Polls the cache's subscription set and keeps the session in step with it.
///
/// Runs until the session drops its receiving end. A failed cache read skips
/// the round instead of treating the set as empty.
pub async fn run_subscription_manager(
    quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
    subscribed: SubscribedSet,
    outbound: mpsc::UnboundedSender<ControlMessage>,
    poll_period: Duration,
) {
    let mut ticker = time::interval_at(time::Instant::now() + poll_period, poll_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if outbound.is_closed() {
            debug!("[Sub] Session closed, stopping subscription manager");
            return;
        }

        match quote_cache.get_symbols().await {
            Ok(wanted) => {
                let (added, removed) = sync_subscriptions(&wanted, &subscribed, &outbound).await;
                if added > 0 || removed > 0 {
                    info!(added, removed, "[Sub] Subscription update applied");
                }
            }
            Err(e) => error!("[Sub] Subscription update failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryQuoteCache;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_sync_queues_subscribe_and_unsubscribe() {
        let subscribed: SubscribedSet = Arc::new(Mutex::new(set(&["A", "B"])));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let counts = sync_subscriptions(&set(&["B", "C"]), &subscribed, &tx).await;

        assert_eq!(counts, (1, 1));
        assert_eq!(
            rx.recv().await.unwrap(),
            ControlMessage::Subscribe {
                symbol: "C".to_string()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ControlMessage::Unsubscribe {
                symbol: "A".to_string()
            }
        );
        assert_eq!(*subscribed.lock().await, set(&["B", "C"]));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_fail_open() {
        let subscribed: SubscribedSet = Arc::new(Mutex::new(set(&["A"])));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let counts = sync_subscriptions(&set(&["Z"]), &subscribed, &tx).await;

        // Z could not be queued so it is not tracked; A is dropped regardless.
        assert_eq!(counts, (0, 1));
        assert!(subscribed.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_follows_cache_changes() {
        let cache = Arc::new(InMemoryQuoteCache::with_symbols(&["A"]));
        let subscribed: SubscribedSet = Arc::new(Mutex::new(set(&["A"])));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let manager = tokio::spawn(run_subscription_manager(
            cache.clone(),
            subscribed.clone(),
            tx,
            Duration::from_secs(30),
        ));

        *cache.symbols.lock().unwrap() = set(&["B"]);

        assert_eq!(
            rx.recv().await.unwrap(),
            ControlMessage::Subscribe {
                symbol: "B".to_string()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ControlMessage::Unsubscribe {
                symbol: "A".to_string()
            }
        );
        assert_eq!(*subscribed.lock().await, set(&["B"]));

        manager.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_keeps_subscriptions_when_cache_read_fails() {
        let cache = Arc::new(InMemoryQuoteCache::with_symbols(&[]));
        cache
            .fail_reads
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let subscribed: SubscribedSet = Arc::new(Mutex::new(set(&["A"])));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let manager = tokio::spawn(run_subscription_manager(
            cache,
            subscribed.clone(),
            tx,
            Duration::from_secs(30),
        ));

        time::sleep(Duration::from_secs(95)).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(*subscribed.lock().await, set(&["A"]));

        manager.abort();
    }
}
