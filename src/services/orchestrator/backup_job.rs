use crate::env_config::models::app_config::BackupConfig;
use crate::error::{PipelineError, PipelineResult};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;
use tracing::{info, warn};

/// Runs the export in a child process and pushes the file only if it succeeded.
///
/// Both steps share one deadline; children still running at the deadline are
/// killed.
pub struct BackupJob {
    /// Executable that understands the `backup --output <path>` subcommand
    program: PathBuf,
    output: PathBuf,
    push_command: Vec<String>,
    timeout: Duration,
}

impl BackupJob {
    pub fn new(program: PathBuf, config: &BackupConfig) -> Self {
        Self {
            program,
            output: config.output_path.clone(),
            push_command: config.push_command.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    pub async fn run(&self) -> PipelineResult<()> {
        match time::timeout(self.timeout, self.export_and_push()).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout {
                job: "backup".to_string(),
                after: self.timeout,
            }),
        }
    }

    async fn export_and_push(&self) -> PipelineResult<()> {
        info!("Starting backup process");
        let status = Command::new(&self.program)
            .arg("backup")
            .arg("--output")
            .arg(&self.output)
            .kill_on_drop(true)
            .status()
            .await?;

        if !status.success() {
            warn!("Backup process failed, skipping push");
            return Err(PipelineError::Subprocess {
                command: "backup".to_string(),
                status,
            });
        }

        let Some((program, args)) = self.push_command.split_first() else {
            return Err(PipelineError::Config("backup.push_command is empty".to_string()));
        };

        let status = Command::new(program)
            .args(args)
            .arg(&self.output)
            .kill_on_drop(true)
            .status()
            .await?;

        if !status.success() {
            return Err(PipelineError::Subprocess {
                command: program.clone(),
                status,
            });
        }

        info!("Backup pushed: {}", self.output.display());
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::utils::time_window::TimeWindow;

    fn config(output: PathBuf, push_command: &[&str]) -> BackupConfig {
        BackupConfig {
            enabled: true,
            window: TimeWindow::parse("00:00:00", "00:05:00").unwrap(),
            output_path: output,
            push_command: push_command.iter().map(|s| s.to_string()).collect(),
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn test_push_runs_with_output_path_after_successful_export() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("price_history.csv");
        // `touch` stands in for the push and leaves a mark at the path it receives.
        let job = BackupJob::new(PathBuf::from("true"), &config(output.clone(), &["touch"]));

        job.run().await.unwrap();

        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_failed_export_skips_push() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("price_history.csv");
        let job = BackupJob::new(PathBuf::from("false"), &config(output.clone(), &["touch"]));

        let err = job.run().await.unwrap_err();

        assert!(matches!(err, PipelineError::Subprocess { ref command, .. } if command == "backup"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_failed_push_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let job = BackupJob::new(
            PathBuf::from("true"),
            &config(dir.path().join("out.csv"), &["false"]),
        );

        let err = job.run().await.unwrap_err();

        assert!(matches!(err, PipelineError::Subprocess { ref command, .. } if command == "false"));
    }

    #[tokio::test]
    async fn test_push_running_past_the_deadline_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        // The appended path lands in `$0`, so the push just sleeps.
        let mut config = config(dir.path().join("out.csv"), &["sh", "-c", "sleep 5"]);
        config.timeout_seconds = 1;
        let job = BackupJob::new(PathBuf::from("true"), &config);

        let started = std::time::Instant::now();
        let err = job.run().await.unwrap_err();

        assert!(matches!(err, PipelineError::Timeout { ref job, .. } if job == "backup"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
