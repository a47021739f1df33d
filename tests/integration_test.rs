// Integration tests for the Batch Apps client
//
// These tests drive the public API end to end against a local mock of the
// service: file uploads, job submission, monitoring and output downloads.

use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use batch_apps::{
    auth::{AadSettings, AuthManager, Credentials, Token, TokenStore},
    config::Configuration,
    api::{BatchAppsApi, JobRef, PoolRef},
    error::BatchAppsError,
    files::FileManager,
    http_client::BatchAppsHttpClient,
    jobs::{JobFile, JobManager},
    monitor::JobMonitor,
    pools::PoolManager,
};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

const CONFIG: &str = "\
[Blender]
default_jobtype = True
start = 1
end = 4
format = PNG

[Logging]
level = 30

[Authentication]
endpoint = test.batchapps.core.windows.net
";

fn test_token() -> Token {
    Token {
        token_type: "Bearer".to_string(),
        access_token: "integration-token".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_at: chrono::Utc::now().timestamp() + 3600,
        resource: None,
        scope: None,
    }
}

/// API client pointed at the mock server, with no token persistence
fn create_test_api(server: &Server) -> Arc<BatchAppsApi> {
    let credentials = Credentials::from_parts(
        "integration-client",
        AadSettings::default(),
        test_token(),
        TokenStore::disabled(),
    )
    .unwrap();
    let auth = Arc::new(AuthManager::new(credentials, 300).unwrap());
    let http = BatchAppsHttpClient::with_defaults(auth)
        .unwrap()
        .with_retry_policy(0, 1);
    Arc::new(BatchAppsApi::with_base_url(http, format!("{}/api", server.url())))
}

fn job_body(status: &str, extra: serde_json::Value) -> String {
    let mut body = json!({
        "id": "job-1",
        "name": "turntable",
        "type": "Blender",
        "status": status,
        "taskCount": 2,
        "instanceCount": 3,
    });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        body.extend(extra.clone());
    }
    body.to_string()
}

// ==================================================================================================
// Job Flow Tests
// ==================================================================================================

#[tokio::test]
async fn test_submit_watch_and_download() {
    let mut server = Server::new_async().await;
    let api = create_test_api(&server);
    let config = Configuration::from_ini(CONFIG, None).unwrap();

    let workdir = tempfile::tempdir().unwrap();
    let scene = workdir.path().join("scene.blend");
    let texture = workdir.path().join("wood.png");
    std::fs::write(&scene, "blend data").unwrap();
    std::fs::write(&texture, "png data").unwrap();

    // Nothing is in the cloud yet
    server
        .mock("POST", "/api/files/query/byspecification")
        .match_header("authorization", "Bearer integration-token")
        .with_body(r#"{"files": []}"#)
        .create_async()
        .await;
    let put_scene = server
        .mock("PUT", "/api/files/scene.blend")
        .match_query(Matcher::UrlEncoded("ContentLength".into(), "10".into()))
        .create_async()
        .await;
    let put_texture = server
        .mock("PUT", "/api/files/wood.png")
        .match_query(Matcher::Any)
        .create_async()
        .await;
    let send_job = server
        .mock("POST", "/api/jobs")
        .match_body(Matcher::PartialJson(json!({
            "Name": "turntable",
            "Type": "Blender",
            "JobFile": "scene.blend",
            "autoPoolSpecification": {"targetDedicated": "3"}
        })))
        .with_body(r#"{"jobId": "job-1", "link": {"href": "https://host/api/jobs/job-1"}}"#)
        .create_async()
        .await;

    let files = FileManager::new(Arc::clone(&api));
    let collection = files.create_file_set(vec![
        files.create_file(&scene),
        files.create_file(&texture),
        files.create_file(&scene),
    ]);
    assert_eq!(collection.len(), 2);

    let jobs = JobManager::new(Arc::clone(&api), &config);
    let mut submission = jobs.create_job("turntable");
    submission.set_param("end", 2);
    submission.add_file_collection(Some(collection));
    submission.set_job_file(JobFile::Index(0)).unwrap();

    let submitted = jobs.submit(&submission, Some(2)).await.unwrap();
    assert_eq!(submitted.id, "job-1");
    put_scene.assert_async().await;
    put_texture.assert_async().await;
    send_job.assert_async().await;

    // The job finishes on the first refresh
    let output_url = format!("{}/api/jobs/job-1/outputs/output", server.url());
    server
        .mock("GET", "/api/jobs/job-1")
        .with_body(job_body(
            "Complete",
            json!({
                "percentComplete": 100,
                "outputFileName": "turntable.zip",
                "outputLink": {"href": output_url}
            }),
        ))
        .create_async()
        .await;
    server
        .mock("GET", "/api/jobs/job-1/tasks")
        .with_body(r#"{"tasks": [{"id": 0, "status": "InProgress"}, {"id": 1, "status": "InProgress"}]}"#)
        .create_async()
        .await;
    server
        .mock("HEAD", "/api/jobs/job-1/outputs/output")
        .with_header("content-length", "7")
        .with_body("zipdata")
        .create_async()
        .await;
    server
        .mock("GET", "/api/jobs/job-1/outputs/output")
        .with_body("zipdata")
        .create_async()
        .await;

    let mut job = jobs.get_job(&JobRef::Id(submitted.id.clone())).await.unwrap();
    assert_eq!(job.status, "Complete");
    job.status = "InProgress".to_string();

    let downloads = tempfile::tempdir().unwrap();
    let mut seen = Vec::new();
    JobMonitor::new(Duration::from_millis(10), Duration::from_secs(5))
        .with_downloads(downloads.path())
        .watch(&mut job, |job| seen.push(job.status.clone()))
        .await
        .unwrap();

    assert_eq!(seen, vec!["InProgress".to_string(), "Complete".to_string()]);
    let output = downloads.path().join("turntable.zip");
    assert_eq!(std::fs::read_to_string(output).unwrap(), "zipdata");
}

#[tokio::test]
async fn test_resubmit_skips_uploaded_files() {
    let mut server = Server::new_async().await;
    let api = create_test_api(&server);
    let config = Configuration::from_ini(CONFIG, None).unwrap();

    let workdir = tempfile::tempdir().unwrap();
    let scene = workdir.path().join("scene.blend");
    std::fs::write(&scene, "blend data").unwrap();

    let files = FileManager::new(Arc::clone(&api));
    let local = files.create_file(&scene);

    server
        .mock("POST", "/api/files/query/byspecification")
        .with_body(
            json!({"files": [{
                "id": "f1",
                "name": "scene.blend",
                "lastModifiedTime": local.last_modified(),
                "link": {"href": format!("{}/api/files/f1", server.url())}
            }]})
            .to_string(),
        )
        .create_async()
        .await;
    let put = server
        .mock("PUT", Matcher::Regex("^/api/files/.*".to_string()))
        .expect(0)
        .create_async()
        .await;
    server
        .mock("POST", "/api/jobs")
        .with_body(r#"{"jobId": "job-2", "link": {"href": "https://host/api/jobs/job-2"}}"#)
        .create_async()
        .await;

    let jobs = JobManager::new(Arc::clone(&api), &config);
    let mut submission = jobs.create_job("again");
    submission.set_job_file(JobFile::File(local)).unwrap_err();
    submission.add_file_collection(None);
    submission
        .set_job_file(JobFile::File(files.create_file(&scene)))
        .unwrap();

    let submitted = jobs.submit(&submission, None).await.unwrap();
    assert_eq!(submitted.id, "job-2");
    put.assert_async().await;
}

#[tokio::test]
async fn test_failed_job_reports_status() {
    let mut server = Server::new_async().await;
    let api = create_test_api(&server);
    let config = Configuration::from_ini(CONFIG, None).unwrap();

    server
        .mock("GET", "/api/jobs/job-1")
        .with_body(job_body("Error", json!({})))
        .create_async()
        .await;
    let logs = server
        .mock("GET", "/api/jobs/job-1/log")
        .match_query(Matcher::UrlEncoded("maxResults".into(), "100".into()))
        .with_body(r#"{"messages": [{"taskId": "1", "text": "Renderer crashed"}]}"#)
        .create_async()
        .await;

    let jobs = JobManager::new(api, &config);
    let mut job = jobs.get_job(&JobRef::Id("job-1".to_string())).await.unwrap();
    let err = JobMonitor::new(Duration::from_millis(10), Duration::from_secs(5))
        .watch(&mut job, |_| {})
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Job is no longer running. Status: Error");
    logs.assert_async().await;
}

#[tokio::test]
async fn test_unauthorized_is_reported() {
    let mut server = Server::new_async().await;
    let api = create_test_api(&server);
    let config = Configuration::from_ini(CONFIG, None).unwrap();

    server
        .mock("GET", "/api/jobs")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body("Token rejected")
        .create_async()
        .await;

    let mut jobs = JobManager::new(api, &config);
    let err = jobs.get_jobs(0, 10, None).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(matches!(err, BatchAppsError::Unauthorized(_)));
}

// ==================================================================================================
// File And Pool Tests
// ==================================================================================================

#[tokio::test]
async fn test_find_and_download_cloud_file() {
    let mut server = Server::new_async().await;
    let api = create_test_api(&server);
    let file_url = format!("{}/api/files/f1", server.url());

    server
        .mock("POST", "/api/files/query/byname")
        .match_body(Matcher::Json(json!({"Names": ["wood.png"]})))
        .with_body(
            json!({"files": [{
                "id": "f1",
                "name": "wood.png",
                "lastModifiedTime": "2015-01-01T10:00:00Z",
                "link": {"href": file_url}
            }]})
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("HEAD", "/api/files/f1")
        .with_header("content-length", "4")
        .with_body("wood")
        .create_async()
        .await;
    server
        .mock("GET", "/api/files/f1")
        .with_body("wood")
        .create_async()
        .await;

    let files = FileManager::new(Arc::clone(&api));
    let found = files.find_files(&["wood.png".to_string()]).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(!found[0].exists());

    let dir = tempfile::tempdir().unwrap();
    let size = api.props_file(&found[0]).await.unwrap();
    let path = api.get_file(&found[0], size, dir.path(), false).await.unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "wood");
}

#[tokio::test]
async fn test_pool_lifecycle() {
    let mut server = Server::new_async().await;
    let api = create_test_api(&server);

    server
        .mock("POST", "/api/pools")
        .match_body(Matcher::PartialJson(json!({"targetDedicated": "2"})))
        .with_body(r#"{"poolId": "pool-1", "link": {"href": "https://host/api/pools/pool-1"}}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/pools/pool-1")
        .with_body(
            r#"{"id": "pool-1", "targetDedicated": "2", "currentDedicated": 0,
                "maxTasksPerTVM": "1", "state": "active", "jobs": []}"#,
        )
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/api/pools/pool-1")
        .create_async()
        .await;

    let manager = PoolManager::new(api);
    let mut spec = manager.create_pool(2, 1, false);
    assert!(spec.add_cert("abc123", None, None, None));
    let started = spec.start().await.unwrap();
    assert_eq!(started.id, "pool-1");

    let pool = manager.get_pool(&PoolRef::Id(started.id)).await.unwrap();
    assert_eq!(pool.target_size, 2);
    assert_eq!(pool.state.as_deref(), Some("active"));

    pool.delete().await.unwrap();
    delete.assert_async().await;
}
