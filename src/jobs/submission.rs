use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::BatchAppsApi;
use crate::error::{BatchAppsError, Result};
use crate::files::{FileCollection, UserFile};
use crate::models::SubmittedRef;
use crate::pools::{Pool, PoolSpecifier};

/// Smallest auto-pool created for a job
pub const MIN_AUTO_POOL_SIZE: u32 = 3;

/// Job file selection
#[derive(Debug, Clone)]
pub enum JobFile {
    /// Index into the required files
    Index(usize),
    /// A file, added to the required files if needed
    File(UserFile),
}

/// A job that has yet to be submitted
pub struct JobSubmission {
    api: Arc<BatchAppsApi>,
    jobtype: String,
    defaults: Vec<(String, String)>,
    pub name: String,
    params: Vec<(String, String)>,
    pub required_files: Option<FileCollection>,
    pub source: String,
    pub instances: u32,
    pub pool: Option<String>,
}

impl JobSubmission {
    /// New job of `jobtype`, with parameters seeded from `defaults`
    pub fn new(api: Arc<BatchAppsApi>, name: &str, jobtype: &str, defaults: Vec<(String, String)>) -> Self {
        Self {
            api,
            jobtype: jobtype.to_string(),
            params: defaults.clone(),
            defaults,
            name: name.to_string(),
            required_files: None,
            source: String::new(),
            instances: 0,
            pool: None,
        }
    }

    pub fn jobtype(&self) -> &str {
        &self.jobtype
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_param(&mut self, name: &str, value: impl ToString) {
        let value = value.to_string();
        match self.params.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value,
            None => self.params.push((name.to_string(), value)),
        }
    }

    pub fn remove_param(&mut self, name: &str) -> Result<()> {
        let before = self.params.len();
        self.params.retain(|(k, _)| k != name);
        if self.params.len() == before {
            return Err(BatchAppsError::Validation(format!(
                "'JobSubmission' object has no parameter: {}",
                name
            )));
        }
        Ok(())
    }

    /// Run the job on an existing pool
    pub fn set_pool(&mut self, pool: &Pool) {
        self.pool = pool.id.clone();
    }

    fn collection(&mut self) -> &mut FileCollection {
        let api = Arc::clone(&self.api);
        self.required_files
            .get_or_insert_with(|| FileCollection::new(api))
    }

    pub fn add_file(&mut self, file: UserFile) -> Result<()> {
        self.collection().add(file)
    }

    /// Replace the required files; `None` assigns an empty collection
    pub fn add_file_collection(&mut self, collection: Option<FileCollection>) {
        match collection {
            Some(collection) => {
                tracing::debug!(
                    "Assigning FileCollection with {} userfiles to job",
                    collection.len()
                );
                self.required_files = Some(collection);
            }
            None => {
                tracing::info!("Assigning empty FileCollection to job");
                self.required_files = Some(FileCollection::new(Arc::clone(&self.api)));
            }
        }
    }

    /// Choose the file the job starts from
    pub fn set_job_file(&mut self, job_file: JobFile) -> Result<()> {
        let files = self.required_files.as_mut().ok_or_else(|| {
            BatchAppsError::Validation("This job has no associated FileCollection.".to_string())
        })?;

        self.source = match job_file {
            JobFile::File(file) => {
                let name = file.name().to_string();
                if !files.contains(&file) {
                    tracing::info!("Assigned job file not in collection, adding to required files");
                    files.add(file)?;
                }
                name
            }
            JobFile::Index(index) => files
                .get(index)
                .map(|f| f.name().to_string())
                .ok_or_else(|| {
                    BatchAppsError::Validation(format!(
                        "No job file to match {} could be found.",
                        index
                    ))
                })?,
        };

        tracing::debug!("Assigned file: {} as starting job file", self.source);
        Ok(())
    }

    /// Default parameters overlaid by the job's own
    fn merged_params(&self) -> Vec<(String, String)> {
        let mut merged = self.defaults.clone();
        for (key, value) in &self.params {
            match merged.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = value.clone(),
                None => merged.push((key.clone(), value.clone())),
            }
        }
        merged
    }

    /// Build the job submission message
    pub fn create_job_message(&self) -> Result<Value> {
        let required_files = match &self.required_files {
            Some(files) => files.submit_message()?,
            None => Vec::new(),
        };
        let params: Vec<Value> = self
            .merged_params()
            .into_iter()
            .map(|(name, value)| json!({"Name": name, "Value": value}))
            .collect();

        let mut message = json!({
            "Name": self.name,
            "Type": self.jobtype,
            "RequiredFiles": required_files,
            "Parameters": params,
            "JobFile": self.source,
            "Settings": "",
            "Priority": "Medium",
        });

        match &self.pool {
            Some(pool_id) => {
                message["poolId"] = json!(pool_id);
            }
            None => {
                let size = self.instances.max(MIN_AUTO_POOL_SIZE);
                let spec = PoolSpecifier::new(Arc::clone(&self.api), size, 1, false);
                message["autoPoolSpecification"] = spec.auto_pool_message(size);
            }
        }

        tracing::debug!("Job message: {}", message);
        Ok(message)
    }

    /// Submit the job; required files are not uploaded here
    pub async fn submit(&self) -> Result<SubmittedRef> {
        let message = self.create_job_message()?;
        let submitted = self.api.send_job(&message).await?;
        tracing::info!("Job successfully submitted with ID: {}", submitted.id);
        Ok(submitted)
    }
}

impl std::fmt::Debug for JobSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSubmission")
            .field("name", &self.name)
            .field("jobtype", &self.jobtype)
            .field("params", &self.params)
            .field("required_files", &self.required_files)
            .field("source", &self.source)
            .field("instances", &self.instances)
            .field("pool", &self.pool)
            .finish()
    }
}
