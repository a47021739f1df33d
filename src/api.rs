// Batch Apps REST API surface
//
// One method per REST call. Responses are checked for the keys later code
// relies on; everything else is handed back as-is.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use crate::config::Configuration;
use crate::error::{BatchAppsError, Result};
use crate::files::UserFile;
use crate::http_client::BatchAppsHttpClient;
use crate::models::{
    AddPoolResponse, CertificateReference, CloudFile, JobList, JobLog, OutputRef,
    PoolList, QuerySpecifier, SubmitResponse, SubmittedRef, TaskInfo, WireOutput,
};
use crate::utils::{url_from_filename, valid_keys};

/// A job addressed by id or by its details url
#[derive(Debug, Clone, PartialEq)]
pub enum JobRef {
    Id(String),
    Url(String),
}

/// A pool addressed by id or by its details url
#[derive(Debug, Clone, PartialEq)]
pub enum PoolRef {
    Id(String),
    Url(String),
}

/// Final job output, by kind (`output` or `preview`) or by url
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSource {
    Kind { job_id: String, kind: String },
    Url(String),
}

/// File produced by a task of a job, by name or by url
///
/// A name given with a url is used as the local file name on download.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputFileSource {
    Name { job_id: String, name: String },
    Url { url: String, name: Option<String> },
}

/// Task list of a job, by job id or by the job's task list url
#[derive(Debug, Clone, PartialEq)]
pub enum TaskListSource {
    Job(String),
    Url(String),
}

/// Query for user files in the cloud
#[derive(Debug, Clone, PartialEq)]
pub enum FileQuery {
    Names(Vec<String>),
    Specifications(Vec<QuerySpecifier>),
}

/// Batch Apps management API
pub struct BatchAppsApi {
    http: BatchAppsHttpClient,
    base_url: String,
}

impl BatchAppsApi {
    /// API rooted at the configured endpoint
    pub fn new(http: BatchAppsHttpClient, config: &Configuration) -> Result<Self> {
        let endpoint = config.endpoint()?;
        Ok(Self::with_base_url(http, format!("https://{}/api", endpoint)))
    }

    /// API rooted at an explicit base url such as `http://127.0.0.1:1234/api`
    pub fn with_base_url(http: BatchAppsHttpClient, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn http(&self) -> &BatchAppsHttpClient {
        &self.http
    }

    /// Full url of an API call
    pub fn url(&self, call: &str) -> String {
        let url = format!("{}/{}", self.base_url, call);
        tracing::debug!("Formatting url: {}", url);
        url
    }

    // ==============================================================================================
    // Jobs
    // ==============================================================================================

    /// List jobs, `per_call` at a time starting from `index`
    pub async fn list_jobs(&self, index: u32, per_call: u32, name: Option<&str>) -> Result<JobList> {
        tracing::debug!("list_jobs, index={}, per_call={}, name={:?}", index, per_call, name);
        let mut params = vec![
            ("maxResults", per_call.to_string()),
            ("startIndex", index.to_string()),
        ];
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            params.push(("nameContains", name.to_string()));
        }

        let resp = self.http.get_json(&self.url("jobs"), &params).await?;
        require_keys(&resp, &["totalCount", "jobs"], None)?;
        Ok(serde_json::from_value(resp)?)
    }

    /// Raw job details, checked for `id`, `name` and `type`
    pub async fn get_job(&self, job: &JobRef) -> Result<Value> {
        tracing::debug!("get_job, job={:?}", job);
        let url = match job {
            JobRef::Id(id) => self.url(&format!("jobs/{}", id)),
            JobRef::Url(url) => url.clone(),
        };

        let resp = self.http.get_json(&url, &[]).await?;
        require_keys(&resp, &["id", "name", "type"], Some("incorrectly formatted job response"))?;
        Ok(resp)
    }

    /// Submit a job message
    pub async fn send_job(&self, message: &Value) -> Result<SubmittedRef> {
        tracing::debug!("send_job, job_message={}", message);
        let resp = self.http.post_json(&self.url("jobs"), Some(message)).await?;
        require_keys(&resp, &["jobId", "link"], Some("incorrectly formatted job response"))?;

        let submitted: SubmitResponse = serde_json::from_value(resp)?;
        Ok(SubmittedRef {
            id: submitted.job_id,
            link: submitted.link.href,
        })
    }

    /// Service log messages of a job
    pub async fn get_log(
        &self,
        job_id: &str,
        since: Option<&str>,
        max_lines: Option<u32>,
    ) -> Result<JobLog> {
        tracing::debug!("get_log, job_id={}, since={:?}, max_lines={:?}", job_id, since, max_lines);
        let mut params = Vec::new();
        if let Some(since) = since.filter(|s| !s.is_empty()) {
            params.push(("since", since.to_string()));
        }
        if let Some(max) = max_lines.filter(|m| *m > 0) {
            params.push(("maxResults", max.to_string()));
        }

        let resp = self
            .http
            .get_json(&self.url(&format!("jobs/{}/log", job_id)), &params)
            .await?;
        if resp.is_null() {
            return Ok(JobLog::default());
        }
        Ok(serde_json::from_value(resp)?)
    }

    pub async fn cancel(&self, job_id: &str) -> Result<Value> {
        tracing::debug!("cancel, job_id={}", job_id);
        self.http
            .post_json(&self.url(&format!("jobs/{}/actions/cancel", job_id)), None)
            .await
    }

    /// Reprocess the failed tasks of a job
    pub async fn reprocess(&self, job_id: &str) -> Result<Value> {
        tracing::debug!("reprocess, job_id={}", job_id);
        self.http
            .post_json(&self.url(&format!("jobs/{}/actions/reprocess", job_id)), None)
            .await
    }

    /// Final outputs of a job
    pub async fn list_outputs(&self, job_id: &str) -> Result<Vec<OutputRef>> {
        tracing::debug!("list_outputs, job_id={}", job_id);
        let resp = self
            .http
            .get_json(&self.url(&format!("jobs/{}/outputs", job_id)), &[])
            .await?;
        output_list(resp, "jobOutputs")
    }

    fn output_url(&self, source: &OutputSource) -> Result<String> {
        match source {
            OutputSource::Url(url) => Ok(url.clone()),
            OutputSource::Kind { job_id, kind } => {
                let kind = kind.to_lowercase();
                if kind != "output" && kind != "preview" {
                    return Err(BatchAppsError::Validation(
                        "output type must be 'output' or 'preview'".to_string(),
                    ));
                }
                Ok(self.url(&format!("jobs/{}/outputs/{}", job_id, kind)))
            }
        }
    }

    /// Download the job output or its preview
    pub async fn get_output(
        &self,
        download_dir: &Path,
        size: u64,
        file_name: Option<&str>,
        overwrite: bool,
        source: &OutputSource,
    ) -> Result<PathBuf> {
        tracing::debug!(
            "get_output, download_dir={}, size={}, fname={:?}, overwrite={}, source={:?}",
            download_dir.display(),
            size,
            file_name,
            overwrite,
            source
        );
        let url = self.output_url(source)?;
        self.http
            .download(&url, download_dir, size, overwrite, file_name, None)
            .await
    }

    /// Size of the job output or its preview
    pub async fn props_output(&self, source: &OutputSource) -> Result<u64> {
        tracing::debug!("props_output, source={:?}", source);
        let url = self.output_url(source)?;
        self.http.head_content_length(&url).await
    }

    /// All files created by the tasks of a job
    pub async fn list_output_files(&self, job_id: &str) -> Result<Vec<OutputRef>> {
        tracing::debug!("list_output_files, job_id={}", job_id);
        let resp = self
            .http
            .get_json(&self.url(&format!("jobs/{}/outputs/files", job_id)), &[])
            .await?;
        output_list(resp, "outputs")
    }

    fn output_file_url(&self, source: &OutputFileSource) -> String {
        match source {
            OutputFileSource::Url { url, .. } => url.clone(),
            OutputFileSource::Name { job_id, name } => self.url(&format!(
                "jobs/{}/outputs/files/{}",
                job_id,
                url_from_filename(name)
            )),
        }
    }

    /// Download a file created by a task
    pub async fn get_output_file(
        &self,
        download_dir: &Path,
        size: u64,
        overwrite: bool,
        source: &OutputFileSource,
    ) -> Result<PathBuf> {
        tracing::debug!(
            "get_output_file, download_dir={}, size={}, overwrite={}, source={:?}",
            download_dir.display(),
            size,
            overwrite,
            source
        );
        let url = self.output_file_url(source);
        let file_name = match source {
            OutputFileSource::Name { name, .. } => Some(name.as_str()),
            OutputFileSource::Url { name, .. } => name.as_deref(),
        };
        self.http
            .download(&url, download_dir, size, overwrite, file_name, None)
            .await
    }

    /// Size of a file created by a task
    pub async fn props_output_file(&self, source: &OutputFileSource) -> Result<u64> {
        tracing::debug!("props_output_file, source={:?}", source);
        self.http.head_content_length(&self.output_file_url(source)).await
    }

    pub async fn list_tasks(&self, source: &TaskListSource) -> Result<Vec<TaskInfo>> {
        tracing::debug!("list_tasks, source={:?}", source);
        let url = match source {
            TaskListSource::Job(id) => self.url(&format!("jobs/{}/tasks", id)),
            TaskListSource::Url(url) => url.clone(),
        };

        let resp = self.http.get_json(&url, &[]).await?;
        let tasks = take_list(resp, "tasks")?;
        tasks
            .into_iter()
            .map(|t| serde_json::from_value(t).map_err(BatchAppsError::from))
            .collect()
    }

    pub async fn list_task_outputs(&self, job_id: &str, task: u32) -> Result<Vec<OutputRef>> {
        tracing::debug!("list_task_outputs, job_id={}, task={}", job_id, task);
        let resp = self
            .http
            .get_json(
                &self.url(&format!("jobs/{}/tasks/{}/outputs/files", job_id, task)),
                &[],
            )
            .await?;
        output_list(resp, "outputs")
    }

    pub async fn cancel_task(&self, job_id: &str, task: u32) -> Result<Value> {
        tracing::debug!("cancel_task, job_id={}, task={}", job_id, task);
        self.http
            .post_json(
                &self.url(&format!("jobs/{}/tasks/{}/actions/cancel", job_id, task)),
                None,
            )
            .await
    }

    // ==============================================================================================
    // User files
    // ==============================================================================================

    /// Files uploaded by the user
    pub async fn list_files(&self) -> Result<Vec<CloudFile>> {
        tracing::debug!("list_files");
        let resp = self.http.get_json(&self.url("files"), &[]).await?;
        file_list(resp)
    }

    /// Cloud files matching names or file specifications
    pub async fn query_files(&self, query: &FileQuery) -> Result<Vec<CloudFile>> {
        tracing::debug!("query_files, query={:?}", query);
        let (call, message) = match query {
            FileQuery::Names(names) if !names.is_empty() => {
                ("files/query/byname", json!({ "Names": names }))
            }
            FileQuery::Specifications(specs) if !specs.is_empty() => {
                ("files/query/byspecification", json!({ "Specifications": specs }))
            }
            _ => return Err(BatchAppsError::Validation("File list empty".to_string())),
        };

        let resp = self.http.post_json(&self.url(call), Some(&message)).await?;
        file_list(resp)
    }

    /// Files of `specs` that are not yet in the cloud
    pub async fn query_missing_files(&self, specs: &[QuerySpecifier]) -> Result<Vec<CloudFile>> {
        tracing::debug!("query_missing_files, files={:?}", specs);
        if specs.is_empty() {
            return Err(BatchAppsError::Validation("File list empty".to_string()));
        }

        let message = json!({ "Specifications": specs });
        let resp = self
            .http
            .post_json(&self.url("files/query/missing"), Some(&message))
            .await?;
        file_list(resp)
    }

    /// Download a user file from its cloud url
    pub async fn get_file(
        &self,
        userfile: &UserFile,
        size: u64,
        download_dir: &Path,
        overwrite: bool,
    ) -> Result<PathBuf> {
        tracing::debug!(
            "get_file, file={}, size={}, download_dir={}, overwrite={}",
            userfile,
            size,
            download_dir.display(),
            overwrite
        );
        let url = userfile_url(userfile)?;
        self.http
            .download(url, download_dir, size, overwrite, Some(userfile.name()), None)
            .await
    }

    /// Size of a user file in the cloud
    pub async fn props_file(&self, userfile: &UserFile) -> Result<u64> {
        tracing::debug!("props_file, file={}", userfile);
        self.http.head_content_length(userfile_url(userfile)?).await
    }

    /// Upload a local user file
    pub async fn send_file(&self, userfile: &UserFile) -> Result<()> {
        tracing::debug!("send_file, file={}", userfile);
        let spec = userfile.create_query_specifier()?;
        let params = [
            ("OriginalFilePath", spec.original_path.unwrap_or_default()),
            ("ContentLength", userfile.len().to_string()),
            ("ContentType", "application/octet-stream".to_string()),
            ("LastModifiedTime", spec.timestamp),
        ];

        let url = self.url(&format!("files/{}", url_from_filename(userfile.name())));
        self.http.put_file(&url, userfile.path(), &params).await
    }

    // ==============================================================================================
    // Pools
    // ==============================================================================================

    pub async fn list_pools(&self) -> Result<PoolList> {
        tracing::debug!("list_pools");
        let resp = self.http.get_json(&self.url("pools"), &[]).await?;
        require_keys(&resp, &["totalCount", "pools"], None)?;
        Ok(serde_json::from_value(resp)?)
    }

    /// Raw pool details
    pub async fn get_pool(&self, pool: &PoolRef) -> Result<Value> {
        tracing::debug!("get_pool, pool={:?}", pool);
        let url = match pool {
            PoolRef::Id(id) => self.url(&format!("pools/{}", id)),
            PoolRef::Url(url) => url.clone(),
        };
        self.http.get_json(&url, &[]).await
    }

    pub async fn add_pool(
        &self,
        target_size: u32,
        max_tasks: u32,
        communication: bool,
        certs: &[CertificateReference],
    ) -> Result<AddPoolResponse> {
        tracing::debug!(
            "add_pool, target_size={}, max_tasks={}, communication={}, certs={:?}",
            target_size,
            max_tasks,
            communication,
            certs
        );
        let message = json!({
            "targetDedicated": target_size.to_string(),
            "maxTasksPerTVM": max_tasks.to_string(),
            "communication": communication,
            "certificateReferences": certs,
        });

        let resp = self.http.post_json(&self.url("pools"), Some(&message)).await?;
        require_keys(&resp, &["poolId", "link"], None)?;
        Ok(serde_json::from_value(resp)?)
    }

    pub async fn resize_pool(&self, pool_id: &str, target_size: u32) -> Result<Value> {
        tracing::debug!("resize_pool, pool_id={}, target_size={}", pool_id, target_size);
        let message = json!({ "targetDedicated": target_size.to_string() });
        self.http
            .post_json(
                &self.url(&format!("pools/{}/actions/resize", pool_id)),
                Some(&message),
            )
            .await
    }

    pub async fn delete_pool(&self, pool_id: &str) -> Result<()> {
        tracing::debug!("delete_pool, pool_id={}", pool_id);
        self.http.delete(&self.url(&format!("pools/{}", pool_id))).await
    }
}

fn require_keys(resp: &Value, keys: &[&str], message: Option<&str>) -> Result<()> {
    if valid_keys(resp, keys) {
        return Ok(());
    }

    let error = match message {
        Some(message) => message.to_string(),
        None => {
            let missing = keys
                .iter()
                .find(|k| resp.get(**k).is_none())
                .copied()
                .unwrap_or_default();
            format!("{} key not in response message", missing)
        }
    };
    tracing::error!("{}: {}", error, resp);
    Err(BatchAppsError::InvalidResponse(error))
}

fn take_list(mut resp: Value, key: &str) -> Result<Vec<Value>> {
    match resp.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        _ => {
            let error = format!("{} key not in response message", key);
            tracing::error!("{}: {}", error, resp);
            Err(BatchAppsError::InvalidResponse(error))
        }
    }
}

fn output_list(resp: Value, key: &str) -> Result<Vec<OutputRef>> {
    take_list(resp, key)?
        .into_iter()
        .map(|o| {
            serde_json::from_value::<WireOutput>(o)
                .map(OutputRef::from)
                .map_err(BatchAppsError::from)
        })
        .collect()
}

fn file_list(resp: Value) -> Result<Vec<CloudFile>> {
    take_list(resp, "files")?
        .into_iter()
        .map(|f| serde_json::from_value(f).map_err(BatchAppsError::from))
        .collect()
}

fn userfile_url(userfile: &UserFile) -> Result<&str> {
    userfile.url().ok_or_else(|| {
        BatchAppsError::FileInvalid(format!("{} has no cloud url", userfile.name()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthManager;
    use mockito::Matcher;
    use std::sync::Arc;

    fn api(server: &mockito::Server) -> BatchAppsApi {
        let auth = Arc::new(AuthManager::new_for_testing("token".to_string(), 300).unwrap());
        let http = BatchAppsHttpClient::with_defaults(auth)
            .unwrap()
            .with_retry_policy(0, 1);
        BatchAppsApi::with_base_url(http, format!("{}/api", server.url()))
    }

    #[tokio::test]
    async fn test_list_jobs_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/jobs")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("maxResults".into(), "10".into()),
                Matcher::UrlEncoded("startIndex".into(), "0".into()),
                Matcher::UrlEncoded("nameContains".into(), "render".into()),
            ]))
            .with_body(r#"{"totalCount": 1, "jobs": [{"id": "1"}]}"#)
            .create_async()
            .await;

        let list = api(&server).list_jobs(0, 10, Some("render")).await.unwrap();
        assert_eq!(list.total_count, 1);
        assert_eq!(list.jobs.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_jobs_missing_key() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs")
            .match_query(Matcher::Any)
            .with_body(r#"{"jobs": []}"#)
            .create_async()
            .await;

        let err = api(&server).list_jobs(0, 10, None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid response: totalCount key not in response message"
        );
    }

    #[tokio::test]
    async fn test_get_job_validates_keys() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs/abc")
            .with_body(r#"{"id": "abc", "name": "job"}"#)
            .create_async()
            .await;

        let err = api(&server)
            .get_job(&JobRef::Id("abc".to_string()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("incorrectly formatted job response"));
    }

    #[tokio::test]
    async fn test_get_job_by_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs/xyz")
            .with_body(r#"{"id": "xyz", "name": "job", "type": "Blender"}"#)
            .create_async()
            .await;

        let url = format!("{}/api/jobs/xyz", server.url());
        let job = api(&server).get_job(&JobRef::Url(url)).await.unwrap();
        assert_eq!(job["type"], "Blender");
    }

    #[tokio::test]
    async fn test_send_job() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/jobs")
            .match_body(Matcher::PartialJson(json!({"Name": "render"})))
            .with_body(r#"{"jobId": "new", "link": {"href": "https://host/api/jobs/new"}}"#)
            .create_async()
            .await;

        let submitted = api(&server)
            .send_job(&json!({"Name": "render"}))
            .await
            .unwrap();
        assert_eq!(submitted.id, "new");
        assert_eq!(submitted.link.as_deref(), Some("https://host/api/jobs/new"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_log_params() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/jobs/abc/log")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("since".into(), "2015-01-01".into()),
                Matcher::UrlEncoded("maxResults".into(), "50".into()),
            ]))
            .with_body(
                r#"{"upTo": "2015-01-02", "messages": [{"taskId": 1, "timestamp": "t", "text": "hello"}]}"#,
            )
            .create_async()
            .await;

        let log = api(&server)
            .get_log("abc", Some("2015-01-01"), Some(50))
            .await
            .unwrap();
        assert_eq!(log.messages.len(), 1);
        assert_eq!(log.messages[0].task_id.as_deref(), Some("1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_not_applicable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/jobs/abc/actions/cancel")
            .with_status(403)
            .with_body("job already complete")
            .create_async()
            .await;

        let err = api(&server).cancel("abc").await.unwrap_err();
        assert!(err.is_not_applicable());
    }

    #[tokio::test]
    async fn test_list_outputs() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs/abc/outputs")
            .with_body(
                r#"{"jobOutputs": [{"name": "out.zip", "link": {"href": "https://x/out"}, "kind": "JobOutput"}]}"#,
            )
            .create_async()
            .await;

        let outputs = api(&server).list_outputs("abc").await.unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].name.as_deref(), Some("out.zip"));
        assert_eq!(outputs[0].kind.as_deref(), Some("JobOutput"));
    }

    #[tokio::test]
    async fn test_list_outputs_missing_key() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs/abc/outputs")
            .with_body(r#"{"outputs": []}"#)
            .create_async()
            .await;

        let err = api(&server).list_outputs("abc").await.unwrap_err();
        assert!(err.to_string().contains("jobOutputs key not in response message"));
    }

    #[tokio::test]
    async fn test_output_kind_validation() {
        let server = mockito::Server::new_async().await;
        let source = OutputSource::Kind {
            job_id: "abc".to_string(),
            kind: "thumbnail".to_string(),
        };
        let err = api(&server).props_output(&source).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: output type must be 'output' or 'preview'"
        );
    }

    #[tokio::test]
    async fn test_get_output_download() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs/abc/outputs/preview")
            .with_body("png-bytes")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = OutputSource::Kind {
            job_id: "abc".to_string(),
            kind: "Preview".to_string(),
        };
        let path = api(&server)
            .get_output(dir.path(), 9, Some("thumb.png"), true, &source)
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("thumb.png"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "png-bytes");
    }

    #[tokio::test]
    async fn test_props_output_file_encodes_name() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("HEAD", "/api/jobs/abc/outputs/files/frame%201.png")
            .with_header("content-length", "1024")
            .with_body("x".repeat(1024))
            .create_async()
            .await;

        let source = OutputFileSource::Name {
            job_id: "abc".to_string(),
            name: "frame 1.png".to_string(),
        };
        let size = api(&server).props_output_file(&source).await.unwrap();
        assert_eq!(size, 1024);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_tasks() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs/abc/tasks")
            .with_body(r#"{"tasks": [{"id": 0, "status": "Complete"}, {"id": 1}]}"#)
            .create_async()
            .await;

        let tasks = api(&server)
            .list_tasks(&TaskListSource::Job("abc".to_string()))
            .await
            .unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].status.as_deref(), Some("Complete"));
    }

    #[tokio::test]
    async fn test_cancel_task() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/jobs/abc/tasks/3/actions/cancel")
            .with_status(200)
            .create_async()
            .await;

        let resp = api(&server).cancel_task("abc", 3).await.unwrap();
        assert!(resp.is_null());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_files_by_name() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/files/query/byname")
            .match_body(Matcher::Json(json!({"Names": ["a.txt"]})))
            .with_body(r#"{"files": [{"name": "a.txt"}]}"#)
            .create_async()
            .await;

        let files = api(&server)
            .query_files(&FileQuery::Names(vec!["a.txt".to_string()]))
            .await
            .unwrap();
        assert_eq!(files[0].name, "a.txt");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_files_empty() {
        let server = mockito::Server::new_async().await;
        let err = api(&server)
            .query_files(&FileQuery::Specifications(vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: File list empty");
    }

    #[tokio::test]
    async fn test_query_missing_files() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/files/query/missing")
            .match_body(Matcher::PartialJson(json!({
                "Specifications": [{"FileName": "a.txt", "Timestamp": "t", "OriginalPath": "/a.txt"}]
            })))
            .with_body(r#"{"files": [{"name": "a.txt"}]}"#)
            .create_async()
            .await;

        let spec = QuerySpecifier {
            file_name: "a.txt".to_string(),
            timestamp: "t".to_string(),
            original_path: Some("/a.txt".to_string()),
        };
        let missing = api(&server).query_missing_files(&[spec]).await.unwrap();
        assert_eq!(missing.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_file() {
        let mut server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my scene.blend");
        std::fs::write(&path, b"blend").unwrap();

        let mock = server
            .mock("PUT", "/api/files/my%20scene.blend")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("ContentLength".into(), "5".into()),
                Matcher::UrlEncoded("ContentType".into(), "application/octet-stream".into()),
            ]))
            .match_header("content-type", "application/octet-stream")
            .match_body("blend")
            .create_async()
            .await;

        let userfile = UserFile::local(&path);
        api(&server).send_file(&userfile).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_missing_file() {
        let server = mockito::Server::new_async().await;
        let userfile = UserFile::local(Path::new("/does/not/exist.txt"));
        let err = api(&server).send_file(&userfile).await.unwrap_err();
        assert!(matches!(err, BatchAppsError::FileMissing(_)));
    }

    #[tokio::test]
    async fn test_add_pool() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/pools")
            .match_body(Matcher::PartialJson(json!({
                "targetDedicated": "5",
                "maxTasksPerTVM": "2",
                "communication": true
            })))
            .with_body(r#"{"poolId": "p1", "link": {"href": "https://host/api/pools/p1"}}"#)
            .create_async()
            .await;

        let resp = api(&server).add_pool(5, 2, true, &[]).await.unwrap();
        assert_eq!(resp.pool_id, "p1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_resize_and_delete_pool() {
        let mut server = mockito::Server::new_async().await;
        let resize = server
            .mock("POST", "/api/pools/p1/actions/resize")
            .match_body(Matcher::Json(json!({"targetDedicated": "8"})))
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/api/pools/p1")
            .create_async()
            .await;

        let api = api(&server);
        api.resize_pool("p1", 8).await.unwrap();
        api.delete_pool("p1").await.unwrap();
        resize.assert_async().await;
        delete.assert_async().await;
    }
}
