pub mod backup_job;
pub mod runner;
pub mod schedule;
pub mod supervisor;
