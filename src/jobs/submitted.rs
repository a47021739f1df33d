use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::random_png_name;
use super::task::Task;
use crate::api::{BatchAppsApi, JobRef, OutputFileSource, OutputSource, TaskListSource};
use crate::error::{BatchAppsError, Result};
use crate::models::{JobLog, JobSummary, OutputRef};

/// Default number of log lines fetched per call
pub const DEFAULT_LOG_LINES: u32 = 100;

/// A job known to the service
#[derive(Clone)]
pub struct SubmittedJob {
    api: Arc<BatchAppsApi>,
    pub id: String,
    pub name: String,
    pub job_type: String,
    pub tasks: Vec<Task>,
    pub percentage: Option<String>,
    pub xml_settings: Option<String>,
    pub status: String,
    pub time_submitted: Option<String>,
    pub time_started: Option<String>,
    pub time_completed: Option<String>,
    pub requested_instances: u32,
    pub number_tasks: u32,
    pub output_filename: Option<String>,
    pub output_url: Option<String>,
    pub thumb_url: Option<String>,
    pub tasks_url: Option<String>,
    pub pool_id: Option<String>,
}

impl SubmittedJob {
    pub fn new(api: Arc<BatchAppsApi>, summary: JobSummary) -> Self {
        let mut job = Self {
            api,
            id: summary.id.clone(),
            name: summary.name.clone(),
            job_type: summary.job_type.clone(),
            tasks: Vec::new(),
            percentage: None,
            xml_settings: None,
            status: String::new(),
            time_submitted: None,
            time_started: None,
            time_completed: None,
            requested_instances: 0,
            number_tasks: 0,
            output_filename: None,
            output_url: None,
            thumb_url: None,
            tasks_url: None,
            pool_id: None,
        };
        job.apply(summary);
        job
    }

    fn apply(&mut self, summary: JobSummary) {
        self.percentage = summary.percent_complete;
        self.xml_settings = summary.settings;
        self.status = summary.status.unwrap_or_else(|| "NotStarted".to_string());
        self.time_submitted = summary.submission_time;
        self.time_started = summary.start_time;
        self.time_completed = summary.completion_time;
        self.requested_instances = summary.instance_count;
        self.number_tasks = summary.task_count;
        self.output_filename = summary.output_file_name;
        self.output_url = summary.output_link.href;
        self.thumb_url = summary.preview_link.href;
        self.tasks_url = summary.task_list_link.href;
        self.pool_id = summary.pool_id;
        tracing::debug!(
            "Extracted job submission data for {}: status={}, tasks={}",
            self.id,
            self.status,
            self.number_tasks
        );
    }

    /// Number of tasks in the job
    pub fn len(&self) -> u32 {
        self.number_tasks
    }

    pub fn is_empty(&self) -> bool {
        self.number_tasks == 0
    }

    /// Refresh the job from the service
    pub async fn update(&mut self) -> Result<()> {
        tracing::debug!("About to update job {}", self.id);
        let resp = self.api.get_job(&JobRef::Id(self.id.clone())).await?;
        let summary: JobSummary = serde_json::from_value(resp)?;
        self.apply(summary);
        Ok(())
    }

    /// Cancel the job; false when the job can no longer be cancelled
    pub async fn cancel(&mut self) -> Result<bool> {
        tracing::debug!("About to cancel job {}", self.id);
        match self.api.cancel(&self.id).await {
            Ok(_) => {
                self.update().await?;
                Ok(true)
            }
            Err(e) if e.is_not_applicable() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Reprocess failed tasks; false when there is nothing to reprocess
    pub async fn reprocess(&self) -> Result<bool> {
        tracing::debug!("About to reprocess job {}", self.id);
        match self.api.reprocess(&self.id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_applicable() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get_tasks(&mut self) -> Result<&[Task]> {
        let source = match &self.tasks_url {
            Some(url) => TaskListSource::Url(url.clone()),
            None => TaskListSource::Job(self.id.clone()),
        };
        let tasks = self.api.list_tasks(&source).await?;
        self.tasks = tasks
            .into_iter()
            .map(|info| Task::new(Arc::clone(&self.api), &self.id, info))
            .collect();
        Ok(&self.tasks)
    }

    /// Download the final job output, or a specific output when given
    pub async fn get_output(
        &self,
        download_dir: &Path,
        output: Option<&OutputRef>,
        overwrite: bool,
    ) -> Result<PathBuf> {
        tracing::info!("About to check size of requested output file before downloading");

        if let Some(output) = output {
            let url = output.link.clone().ok_or_else(|| {
                BatchAppsError::FileDownload("Output has no download link".to_string())
            })?;
            let source = OutputFileSource::Url {
                url,
                name: output.name.clone(),
            };
            let size = self.api.props_output_file(&source).await?;
            return self
                .api
                .get_output_file(download_dir, size, overwrite, &source)
                .await;
        }

        match (&self.output_url, &self.output_filename) {
            (Some(url), Some(filename)) => {
                let source = OutputSource::Url(url.clone());
                let size = self.api.props_output(&source).await?;
                tracing::debug!("Successfully retrieved output size data: {}", size);
                self.api
                    .get_output(download_dir, size, Some(filename), overwrite, &source)
                    .await
            }
            _ => Err(BatchAppsError::FileDownload(
                "Job has no reference to an output file, please update to check if the output is ready"
                    .to_string(),
            )),
        }
    }

    /// Every file produced by the job's tasks
    pub async fn list_all_outputs(&self) -> Result<Vec<OutputRef>> {
        self.api.list_output_files(&self.id).await
    }

    /// Download the job thumbnail
    ///
    /// Defaults to the system temp directory and a random `.png` name.
    pub async fn get_thumbnail(
        &self,
        download_dir: Option<&Path>,
        filename: Option<&str>,
        overwrite: bool,
    ) -> Result<PathBuf> {
        let url = self.thumb_url.clone().ok_or_else(|| {
            BatchAppsError::FileDownload(
                "Job has no reference to a thumbnail, please update to check if the thumbnail is ready"
                    .to_string(),
            )
        })?;

        let dir = download_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let filename = filename.map(str::to_string).unwrap_or_else(random_png_name);

        self.api
            .get_output(&dir, 0, Some(&filename), overwrite, &OutputSource::Url(url))
            .await
    }

    /// Service logs of the job; failures are logged and yield `None`
    pub async fn get_logs(&self, since: Option<&str>, max_lines: Option<u32>) -> Option<JobLog> {
        match self.api.get_log(&self.id, since, max_lines).await {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::error!("Failed to retrieve job logs. Error: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for SubmittedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmittedJob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("job_type", &self.job_type)
            .field("status", &self.status)
            .field("percentage", &self.percentage)
            .field("number_tasks", &self.number_tasks)
            .field("pool_id", &self.pool_id)
            .finish()
    }
}
