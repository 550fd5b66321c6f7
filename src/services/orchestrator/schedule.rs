use crate::env_config::models::app_config::AppConfig;
use crate::utils::time_window::{ResetRule, TimeWindow};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use tracing::debug;

pub type JobId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Runs for the whole window as a background task
    Fetcher,
    Backup,
    Cleanup { table: String },
}

#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub kind: JobKind,
    pub window: TimeWindow,
    pub reset: ResetRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Running,
    /// Finished for the window occurrence that started on this date
    Done(NaiveDate),
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Idle => f.write_str("idle"),
            JobPhase::Running => f.write_str("running"),
            JobPhase::Done(date) => write!(f, "done({})", date),
        }
    }
}

/// Table of time-windowed jobs and their phases.
///
/// Daily jobs move `Idle -> Running -> Done(day) -> Idle`, firing at most once
/// per reset cycle. The fetcher moves `Idle -> Running -> Idle`, leaving
/// `Running` when its window closes.
#[derive(Debug)]
pub struct Scheduler {
    jobs: Vec<JobSpec>,
    phases: Vec<JobPhase>,
}

impl Scheduler {
    pub fn new(jobs: Vec<JobSpec>) -> Self {
        let phases = vec![JobPhase::Idle; jobs.len()];
        Self { jobs, phases }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut jobs = vec![JobSpec {
            name: "fetcher".to_string(),
            kind: JobKind::Fetcher,
            window: config.fetcher.window,
            reset: ResetRule::WindowExit,
        }];

        if config.backup.enabled {
            jobs.push(JobSpec {
                name: "backup".to_string(),
                kind: JobKind::Backup,
                window: config.backup.window,
                reset: ResetRule::DateRollover,
            });
        }

        jobs.extend(config.cleanup.iter().map(|cleanup| JobSpec {
            name: format!("cleanup:{}", cleanup.table),
            kind: JobKind::Cleanup {
                table: cleanup.table.clone(),
            },
            window: cleanup.window,
            reset: cleanup.reset,
        }));

        Self::new(jobs)
    }

    pub fn job(&self, id: JobId) -> &JobSpec {
        &self.jobs[id]
    }

    pub fn phase(&self, id: JobId) -> JobPhase {
        self.phases[id]
    }

    pub fn jobs(&self) -> impl Iterator<Item = (JobId, &JobSpec)> {
        self.jobs.iter().enumerate()
    }

    /// Applies reset transitions for `now`, then returns the jobs that start.
    ///
    /// Returned jobs are already `Running`.
    pub fn tick(&mut self, now: NaiveDateTime) -> Vec<JobId> {
        let time = now.time();
        let mut due = Vec::new();

        for (id, job) in self.jobs.iter().enumerate() {
            let inside = job.window.contains(time);
            let previous = self.phases[id];

            let current = match previous {
                JobPhase::Running if job.kind == JobKind::Fetcher && !inside => JobPhase::Idle,
                JobPhase::Done(date) if is_reset(job, date, now) => JobPhase::Idle,
                phase => phase,
            };

            let next = if current == JobPhase::Idle && inside {
                due.push(id);
                JobPhase::Running
            } else {
                current
            };

            if next != previous {
                debug!(job = %job.name, "Phase {} -> {}", previous, next);
            }
            self.phases[id] = next;
        }

        due
    }

    /// Marks a daily job as done for the occurrence covering `now`.
    pub fn finish(&mut self, id: JobId, now: NaiveDateTime) {
        let date = self.jobs[id].window.occurrence_date(now);
        self.phases[id] = JobPhase::Done(date);
    }

    /// Returns a running job to `Idle` so the next tick may start it again.
    pub fn abandon(&mut self, id: JobId) {
        self.phases[id] = JobPhase::Idle;
    }

    /// Daily jobs whose window holds `now`.
    pub fn open_daily_windows(&self, now: NaiveDateTime) -> Vec<&JobSpec> {
        self.jobs
            .iter()
            .filter(|job| job.kind != JobKind::Fetcher && job.window.contains(now.time()))
            .collect()
    }
}

fn is_reset(job: &JobSpec, done_on: NaiveDate, now: NaiveDateTime) -> bool {
    match job.reset {
        ResetRule::WindowExit => !job.window.contains(now.time()),
        ResetRule::DateRollover => job.window.occurrence_date(now) != done_on,
    }
}
