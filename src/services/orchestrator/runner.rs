use super::backup_job::BackupJob;
use super::schedule::{JobId, JobKind, JobPhase, Scheduler};
use super::supervisor::FetcherSupervisor;
use crate::db::postgres::listener::TraitInstrumentChangeListener;
use crate::services::maintenance::cleaner::RetentionCleaner;
use crate::services::symbols::synchronizer::SymbolSynchronizer;
use chrono::{NaiveDateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

/// Drives the job table on a fixed poll period.
///
/// A failing job is logged and marked done for its cycle; nothing here stops
/// the loop.
pub struct Orchestrator {
    scheduler: Scheduler,
    supervisor: FetcherSupervisor,
    cleaner: RetentionCleaner,
    backup: Option<BackupJob>,
    poll: Duration,
}

impl Orchestrator {
    pub fn new(
        scheduler: Scheduler,
        supervisor: FetcherSupervisor,
        cleaner: RetentionCleaner,
        backup: Option<BackupJob>,
        poll: Duration,
    ) -> Self {
        Self {
            scheduler,
            supervisor,
            cleaner,
            backup,
            poll,
        }
    }

    pub async fn run(mut self) {
        self.log_open_windows(Utc::now().naive_utc());

        let mut ticker = time::interval(self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick(Utc::now().naive_utc()).await;
        }
    }

    pub async fn tick(&mut self, now: NaiveDateTime) {
        self.recover_fetcher(now);

        for id in self.scheduler.tick(now) {
            self.start(id, now).await;
        }
    }

    async fn start(&mut self, id: JobId, now: NaiveDateTime) {
        let job = self.scheduler.job(id).clone();
        info!(job = %job.name, window = %job.window, "Job window entered");

        match &job.kind {
            JobKind::Fetcher => {
                self.supervisor.ensure_running();
            }
            JobKind::Backup => {
                match &self.backup {
                    Some(backup) => {
                        if let Err(e) = backup.run().await {
                            error!(job = %job.name, "Backup failed: {}", e);
                        }
                    }
                    None => warn!(job = %job.name, "Backup is not configured"),
                }
                self.scheduler.finish(id, now);
            }
            JobKind::Cleanup { table } => {
                match self.cleaner.clean(table).await {
                    Ok(outcome) => info!(job = %job.name, "Cleanup finished: {:?}", outcome),
                    Err(e) => error!(job = %job.name, "Cleanup failed: {}", e),
                }
                self.scheduler.finish(id, now);
            }
        }
    }

    /// A fetcher that died while its window is still open is started again.
    fn recover_fetcher(&mut self, now: NaiveDateTime) {
        if self.supervisor.is_running() {
            return;
        }

        let stale: Vec<JobId> = self
            .scheduler
            .jobs()
            .filter(|(id, job)| {
                job.kind == JobKind::Fetcher
                    && self.scheduler.phase(*id) == JobPhase::Running
                    && job.window.contains(now.time())
            })
            .map(|(id, _)| id)
            .collect();

        for id in stale {
            warn!("Fetcher task is not running inside its window, restarting");
            self.scheduler.abandon(id);
        }
    }

    fn log_open_windows(&self, now: NaiveDateTime) {
        for job in self.scheduler.open_daily_windows(now) {
            warn!(
                job = %job.name,
                window = %job.window,
                "Started inside the job window; it runs now even if it already ran before the restart"
            );
        }
    }
}

/// Reconciles the subscription set on every instrument-table notification.
///
/// Every LISTEN session starts with a reconcile, which covers changes made
/// while no session was open. Failures are retried after `retry`. Runs
/// forever.
pub async fn run_instrument_listener<L>(
    mut listener: L,
    synchronizer: Arc<SymbolSynchronizer>,
    retry: Duration,
) where
    L: TraitInstrumentChangeListener + Send,
{
    loop {
        if let Err(e) = listener.listen().await {
            error!("Failed to start instrument listener: {}", e);
            time::sleep(retry).await;
            continue;
        }
        reconcile(&synchronizer, "listen started").await;

        loop {
            match listener.next_change().await {
                Ok(Some(payload)) => reconcile(&synchronizer, &payload).await,
                Ok(None) => break,
                Err(e) => {
                    error!("Instrument listener error: {}", e);
                    time::sleep(retry).await;
                    break;
                }
            }
        }
    }
}

async fn reconcile(synchronizer: &SymbolSynchronizer, reason: &str) {
    info!("Instrument change detected ({}), syncing Redis", reason);
    if let Err(e) = synchronizer.reconcile().await {
        error!("Symbol reconcile failed: {}", e);
    }
}
