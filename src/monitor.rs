// Job monitoring
//
// Polls a submitted job until it stops, optionally collecting task outputs
// as tasks complete.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{BatchAppsError, Result};
use crate::jobs::{SubmittedJob, DEFAULT_LOG_LINES, TASK_OUTPUT};

/// Default delay between polls
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Default time allowed for a job to finish
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Statuses of a job that stopped without completing
const STOPPED_STATUSES: [&str; 4] = ["Error", "Cancelled", "OnHold", "Cancelling"];

/// Where a job is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobProgress {
    Running,
    Complete,
}

/// Classify a job status
pub fn check_status(status: &str) -> Result<JobProgress> {
    match status {
        "Complete" => Ok(JobProgress::Complete),
        "NotStarted" | "InProgress" => Ok(JobProgress::Running),
        s if STOPPED_STATUSES.contains(&s) => Err(BatchAppsError::JobStopped {
            status: s.to_string(),
        }),
        other => Err(BatchAppsError::Validation(format!(
            "Unexpected status: {}",
            other
        ))),
    }
}

/// Polls a job until completion, failure or timeout
#[derive(Debug, Clone)]
pub struct JobMonitor {
    interval: Duration,
    timeout: Duration,
    download_dir: Option<PathBuf>,
}

impl Default for JobMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_TIMEOUT)
    }
}

impl JobMonitor {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            download_dir: None,
        }
    }

    /// Download task outputs and the final job output into `dir`
    pub fn with_downloads(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Watch `job` until it completes
    ///
    /// `on_update` is called with the job after every poll. A job that stops
    /// without completing yields `JobStopped` once its logs have been fetched.
    pub async fn watch<F>(&self, job: &mut SubmittedJob, mut on_update: F) -> Result<()>
    where
        F: FnMut(&SubmittedJob),
    {
        let deadline = Instant::now() + self.timeout;
        let mut downloaded: HashSet<u32> = HashSet::new();

        loop {
            tracing::info!("Latest updates on job {} retrieved.", job.name);
            tracing::info!(
                "Status: {}, progress: {}",
                job.status,
                job.percentage.as_deref().unwrap_or("0")
            );
            on_update(job);

            if self.download_dir.is_some() {
                self.download_completed_tasks(job, &mut downloaded).await?;
            }

            match check_status(&job.status) {
                Ok(JobProgress::Complete) => {
                    tracing::info!("Job {} successfully completed", job.id);
                    if let Some(dir) = &self.download_dir {
                        let path = job.get_output(dir, None, false).await?;
                        tracing::info!("Job output downloaded to {}", path.display());
                    }
                    return Ok(());
                }
                Ok(JobProgress::Running) => {}
                Err(BatchAppsError::JobStopped { status }) => {
                    tracing::error!("Job {} has stopped. Job status: {}", job.id, status);
                    self.log_job_messages(job).await;
                    return Err(BatchAppsError::JobStopped { status });
                }
                Err(e) => return Err(e),
            }

            if Instant::now() + self.interval > deadline {
                tracing::error!("Timeout occurred while watching job {}", job.id);
                return Err(BatchAppsError::Timeout(self.timeout.as_secs()));
            }

            tokio::time::sleep(self.interval).await;
            job.update().await?;
        }
    }

    async fn download_completed_tasks(&self, job: &mut SubmittedJob, downloaded: &mut HashSet<u32>) -> Result<()> {
        let Some(dir) = &self.download_dir else {
            return Ok(());
        };
        tracing::debug!("Checking for new tasks to download");

        let number_tasks = job.number_tasks;
        let tasks = job.get_tasks().await?;
        for task in tasks {
            // The merge task has the highest id and no task outputs
            if !task.is_complete() || task.id >= number_tasks || downloaded.contains(&task.id) {
                continue;
            }

            for output in task
                .outputs
                .iter()
                .filter(|o| o.kind.as_deref() == Some(TASK_OUTPUT))
            {
                tracing::info!(
                    "Task {} output {} downloading",
                    task.id,
                    output.name.as_deref().unwrap_or_default()
                );
                task.get_output(output, dir, false).await?;
            }
            downloaded.insert(task.id);
        }
        Ok(())
    }

    async fn log_job_messages(&self, job: &SubmittedJob) {
        match job.get_logs(None, Some(DEFAULT_LOG_LINES)).await {
            Some(log) if !log.messages.is_empty() => {
                for message in &log.messages {
                    tracing::error!(
                        task = message.task_id.as_deref().unwrap_or("-"),
                        "{}",
                        message.text
                    );
                }
            }
            _ => tracing::warn!("No job logs for job {}", job.id),
        }
    }
}
