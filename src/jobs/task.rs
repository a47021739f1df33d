use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::random_png_name;
use crate::api::{BatchAppsApi, OutputFileSource};
use crate::error::{BatchAppsError, Result};
use crate::models::{OutputRef, TaskInfo};

/// Output kind of a task thumbnail
pub const TASK_PREVIEW: &str = "TaskPreview";

/// Output kind of a regular task output
pub const TASK_OUTPUT: &str = "TaskOutput";

/// A single task of a submitted job
#[derive(Clone)]
pub struct Task {
    api: Arc<BatchAppsApi>,
    job_id: String,
    pub id: u32,
    pub status: Option<String>,
    pub completion_time: Option<String>,
    pub instance: Option<String>,
    pub deployment: Option<String>,
    pub cores: Option<String>,
    pub charge_time: Option<String>,
    pub non_charge_time: Option<String>,
    pub outputs: Vec<OutputRef>,
}

impl Task {
    pub fn new(api: Arc<BatchAppsApi>, job_id: &str, info: TaskInfo) -> Self {
        Self {
            api,
            job_id: job_id.to_string(),
            id: info.id,
            status: info.status,
            completion_time: info.completion_time,
            instance: info.instance_id,
            deployment: info.deployment_id,
            cores: info.core_count,
            charge_time: info.charge_time,
            non_charge_time: info.non_charge_time,
            outputs: info.outputs.into_iter().map(OutputRef::from).collect(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("Complete")
    }

    async fn download(&self, output: &OutputRef, name: &str, download_dir: &Path, overwrite: bool) -> Result<PathBuf> {
        let url = output.link.clone().ok_or_else(|| {
            BatchAppsError::FileDownload(format!("Output {} has no download link", name))
        })?;
        let source = OutputFileSource::Url {
            url,
            name: Some(name.to_string()),
        };

        // Previews are small and report no size
        let size = if output.kind.as_deref() == Some(TASK_PREVIEW) {
            0
        } else {
            self.api.props_output_file(&source).await?
        };

        self.api
            .get_output_file(download_dir, size, overwrite, &source)
            .await
    }

    /// Refresh the list of files produced by the task
    pub async fn list_outputs(&mut self) -> Result<&[OutputRef]> {
        self.outputs = self.api.list_task_outputs(&self.job_id, self.id).await?;
        Ok(&self.outputs)
    }

    /// Download one of the task's outputs
    pub async fn get_output(&self, output: &OutputRef, download_dir: &Path, overwrite: bool) -> Result<PathBuf> {
        let name = output.name.clone().unwrap_or_default();
        self.download(output, &name, download_dir, overwrite).await
    }

    /// Download the task's thumbnail
    ///
    /// Defaults to the system temp directory, and to the preview's own name.
    pub async fn get_thumbnail(
        &self,
        download_dir: Option<&Path>,
        filename: Option<&str>,
        overwrite: bool,
    ) -> Result<PathBuf> {
        let thumb = self
            .outputs
            .iter()
            .rev()
            .find(|o| o.kind.as_deref() == Some(TASK_PREVIEW))
            .ok_or_else(|| {
                BatchAppsError::FileDownload(
                    "Task has no reference to a thumbnail, please update tasklist to check if the thumbnail is ready"
                        .to_string(),
                )
            })?;

        let name = match (filename, thumb.name.as_deref()) {
            (Some(filename), _) => filename.to_string(),
            (None, Some(name)) if !name.is_empty() => name.to_string(),
            _ => random_png_name(),
        };
        tracing::info!("Found thumbnail in task {}, downloading {}", self.id, name);

        let dir = download_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        self.download(thumb, &name, &dir, overwrite).await
    }

    /// Cancel the task; false when the service says it cannot be cancelled
    pub async fn cancel(&self) -> Result<bool> {
        match self.api.cancel_task(&self.job_id, self.id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_applicable() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("job_id", &self.job_id)
            .field("id", &self.id)
            .field("status", &self.status)
            .field("outputs", &self.outputs)
            .finish()
    }
}
