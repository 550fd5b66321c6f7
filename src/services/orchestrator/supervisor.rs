use crate::services::fetcher::batch_fetcher::BatchFetcher;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Owns the handle of the background fetcher task; at most one is alive.
pub struct FetcherSupervisor {
    fetcher: Arc<BatchFetcher>,
    handle: Option<JoinHandle<()>>,
}

impl FetcherSupervisor {
    pub fn new(fetcher: Arc<BatchFetcher>) -> Self {
        Self {
            fetcher,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Spawns the fetcher unless one is alive. Returns whether it spawned.
    pub fn ensure_running(&mut self) -> bool {
        if self.is_running() {
            return false;
        }

        let fetcher = self.fetcher.clone();
        self.handle = Some(tokio::spawn(async move {
            fetcher.run_within_window().await;
        }));
        info!("Fetcher task started");
        true
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for FetcherSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
