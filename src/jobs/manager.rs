use std::sync::Arc;

use super::submission::JobSubmission;
use super::submitted::SubmittedJob;
use crate::api::{BatchAppsApi, JobRef};
use crate::config::Configuration;
use crate::error::{BatchAppsError, Result};
use crate::models::{JobSummary, SubmittedRef};

/// Default page size when listing jobs
pub const DEFAULT_PER_CALL: u32 = 10;

/// Entry point for creating, submitting and retrieving jobs
pub struct JobManager {
    api: Arc<BatchAppsApi>,
    jobtype: String,
    defaults: Vec<(String, String)>,
    count: Option<u64>,
}

impl JobManager {
    /// Jobs of the configuration's current job type
    pub fn new(api: Arc<BatchAppsApi>, config: &Configuration) -> Self {
        Self {
            api,
            jobtype: config.current_jobtype().to_string(),
            defaults: config.default_params(),
            count: None,
        }
    }

    pub fn api(&self) -> &Arc<BatchAppsApi> {
        &self.api
    }

    /// Total number of jobs seen on the last listing
    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub async fn get_job(&self, job: &JobRef) -> Result<SubmittedJob> {
        let resp = self.api.get_job(job).await?;
        let summary: JobSummary = serde_json::from_value(resp)?;
        Ok(SubmittedJob::new(Arc::clone(&self.api), summary))
    }

    /// Refresh an existing job in place
    pub async fn refresh(&self, job: &mut SubmittedJob) -> Result<()> {
        job.update().await
    }

    /// A page of jobs, optionally filtered by name
    pub async fn get_jobs(&mut self, index: u32, per_call: u32, name: Option<&str>) -> Result<Vec<SubmittedJob>> {
        let list = self.api.list_jobs(index, per_call, name).await?;
        self.count = Some(list.total_count);

        list.jobs
            .into_iter()
            .map(|value| {
                serde_json::from_value::<JobSummary>(value)
                    .map(|summary| SubmittedJob::new(Arc::clone(&self.api), summary))
                    .map_err(|e| {
                        BatchAppsError::InvalidResponse(format!(
                            "Malformed job response object: {}",
                            e
                        ))
                    })
            })
            .collect()
    }

    /// New job seeded with the job type's default parameters
    pub fn create_job(&self, name: &str) -> JobSubmission {
        JobSubmission::new(
            Arc::clone(&self.api),
            name,
            &self.jobtype,
            self.defaults.clone(),
        )
    }

    /// Upload the job's required files, then submit it
    pub async fn submit(&self, submission: &JobSubmission, upload_threads: Option<usize>) -> Result<SubmittedRef> {
        tracing::debug!("Processing job: {}", submission.name);

        if let Some(files) = &submission.required_files {
            if !files.iter().any(|f| f.name() == submission.source) {
                tracing::warn!(
                    "The job file for job {} has not been included in the required files list. Consider revising.",
                    submission.name
                );
            }

            let failed = files.upload(false, upload_threads).await?;
            if !failed.is_empty() {
                for (file, reason) in &failed {
                    tracing::error!("Failed to upload {}: {}", file, reason);
                }
                return Err(BatchAppsError::Upload(format!(
                    "Some required files failed to upload. Discontinuing submission of job {}.",
                    submission.name
                )));
            }
        } else {
            tracing::warn!(
                "The job file for job {} has not been included in the required files list. Consider revising.",
                submission.name
            );
        }

        submission.submit().await
    }
}
