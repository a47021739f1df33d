use futures::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method, Request, Response, StatusCode};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::auth::AuthManager;
use crate::error::{BatchAppsError, Result};
use crate::utils::{download_file_name, filename_from_url};

/// Service API version sent with every call
pub const API_VERSION: &str = "2014-10-01-preview";

/// Number of retries for connection errors, 429 and 5xx responses
pub const DEFAULT_RETRIES: u32 = 3;

/// HTTP client for the Batch Apps REST API with retry logic
pub struct BatchAppsHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Authentication manager
    auth_manager: Arc<AuthManager>,

    /// Maximum number of retries
    max_retries: u32,

    /// Base delay for exponential backoff (milliseconds)
    base_delay_ms: u64,
}

impl BatchAppsHttpClient {
    /// Create a new HTTP client
    pub fn new(
        auth_manager: Arc<AuthManager>,
        connect_timeout: u64,
        request_timeout: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .map_err(|e| BatchAppsError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            auth_manager,
            max_retries,
            base_delay_ms: 1000, // 1 second base delay
        })
    }

    /// Client with default timeouts and retries
    pub fn with_defaults(auth_manager: Arc<AuthManager>) -> Result<Self> {
        Self::new(auth_manager, 30, 300, DEFAULT_RETRIES)
    }

    /// Change the retry policy
    pub fn with_retry_policy(mut self, max_retries: u32, base_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn auth_manager(&self) -> &Arc<AuthManager> {
        &self.auth_manager
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header("x-ms-version", API_VERSION)
    }

    /// Execute a request with retry logic
    /// Automatically handles:
    /// - 401: refreshes token and retries once
    /// - 429: exponential backoff
    /// - 5xx: exponential backoff
    /// - connection errors: exponential backoff
    async fn execute(&self, mut request: Request) -> Result<Response> {
        let token = self.auth_manager.get_access_token().await?;
        set_bearer(&mut request, &token)?;

        let method = request.method().clone();
        let url = request.url().clone();
        tracing::info!("About to make REST call: {} {}", method, url);

        let mut attempt = 0;
        let mut refreshed = false;

        loop {
            // Clone the request for this attempt
            let req = request.try_clone().ok_or_else(|| {
                BatchAppsError::Internal(anyhow::anyhow!("Request body is not cloneable"))
            })?;

            tracing::debug!(
                attempt = attempt + 1,
                max_retries = self.max_retries,
                "Executing request attempt"
            );

            match self.client.execute(req).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        tracing::info!("Successful REST call with status: {}", status.as_u16());
                        return Ok(response);
                    }

                    if status == StatusCode::UNAUTHORIZED && !refreshed {
                        tracing::warn!("Received 401, refreshing token and retrying...");
                        refreshed = true;
                        match self.auth_manager.force_refresh().await {
                            Ok(token) => {
                                set_bearer(&mut request, &token)?;
                                continue;
                            }
                            Err(e) => tracing::error!("Token refresh failed: {}", e),
                        }
                    } else if is_retryable(status) && attempt < self.max_retries {
                        let delay = self.calculate_backoff_delay(attempt);
                        tracing::warn!(
                            "Received {}, retrying after {}ms (attempt {}/{})",
                            status,
                            delay,
                            attempt + 1,
                            self.max_retries
                        );

                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(status_error(response).await);
                }

                Err(e) => {
                    // Network error - retry with backoff
                    if attempt < self.max_retries {
                        let delay = self.calculate_backoff_delay(attempt);
                        tracing::warn!(
                            "Request failed: {}, retrying after {}ms (attempt {}/{})",
                            e,
                            delay,
                            attempt + 1,
                            self.max_retries
                        );

                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }

                    tracing::error!(
                        error = %e,
                        url = %url,
                        total_attempts = attempt + 1,
                        "HTTP request failed after all retries"
                    );
                    return Err(BatchAppsError::Transport(format!(
                        "An error occurred: {}",
                        e
                    )));
                }
            }
        }
    }

    /// Calculate exponential backoff delay
    fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        // Exponential backoff: base_delay * 2^attempt
        // With jitter to avoid thundering herd
        let delay = self.base_delay_ms * 2_u64.pow(attempt);
        let jitter = (delay as f64 * 0.1 * jitter_fraction()) as u64;
        delay + jitter
    }

    /// GET a JSON document
    pub async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value> {
        tracing::debug!("Get call url: {}, params: {:?}", url, params);
        let request = self.request(Method::GET, url).query(params).build()?;
        let response = self.execute(request).await?;

        response.json().await.map_err(|_| {
            BatchAppsError::InvalidResponse("No json object to be decoded from GET call.".to_string())
        })
    }

    /// POST an optional JSON message and decode the JSON reply
    ///
    /// An empty reply decodes to `Value::Null`.
    pub async fn post_json(&self, url: &str, message: Option<&Value>) -> Result<Value> {
        tracing::debug!("Post call url: {}, message: {:?}", url, message);
        let mut builder = self.request(Method::POST, url);
        builder = match message {
            Some(body) => builder.body(serde_json::to_vec(body)?),
            None => builder.header(CONTENT_LENGTH, 0),
        };
        let response = self.execute(builder.build()?).await?;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|_| {
            BatchAppsError::InvalidResponse(
                "No json object to be decoded from POST call.".to_string(),
            )
        })
    }

    /// HEAD a resource and return its content length
    pub async fn head_content_length(&self, url: &str) -> Result<u64> {
        tracing::debug!("Head call url: {}", url);
        let request = self.request(Method::HEAD, url).build()?;
        let response = self.execute(request).await?;

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                BatchAppsError::InvalidResponse(
                    "No content-length key in response headers.".to_string(),
                )
            })
    }

    /// PUT the contents of a local file
    pub async fn put_file(&self, url: &str, path: &Path, params: &[(&str, String)]) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        tracing::debug!(
            "Put call url: {}, file: {}, parameters: {:?}",
            url,
            path.display(),
            params
        );

        let request = self
            .request(Method::PUT, url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .query(params)
            .body(data)
            .build()?;
        self.execute(request).await?;
        Ok(())
    }

    /// DELETE a resource
    pub async fn delete(&self, url: &str) -> Result<()> {
        tracing::debug!("Delete call url: {}", url);
        let request = self.request(Method::DELETE, url).build()?;
        self.execute(request).await?;
        Ok(())
    }

    /// Stream a file to `output_dir`
    ///
    /// The file is named `file_name`, or after the last URL segment plus
    /// `ext`. An existing file is left alone unless `overwrite` is set.
    pub async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        size: u64,
        overwrite: bool,
        file_name: Option<&str>,
        ext: Option<&str>,
    ) -> Result<PathBuf> {
        let filename = match file_name {
            Some(name) => name.to_string(),
            None => filename_from_url(url, ext),
        };
        let target = output_dir.join(download_file_name(&filename)?);

        if target.exists() && !overwrite {
            tracing::warn!("File {} already exists. Not overwriting.", target.display());
            return Ok(target);
        }

        tracing::info!("Starting download to {}", target.display());
        let request = self.request(Method::GET, url).build()?;
        let response = self.execute(request).await?;

        let mut file = tokio::fs::File::create(&target).await?;
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        let mut last_percent = 0;

        if size > 0 {
            tracing::info!("Downloading...0%");
        }

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                BatchAppsError::FileDownload(format!("Download of {} failed: {}", filename, e))
            })?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;

            if size > 0 {
                let percent = (received * 100 / size).min(100);
                if percent > last_percent {
                    last_percent = percent;
                    tracing::info!("Downloading...{}%", percent);
                }
            }
        }

        file.flush().await?;
        tracing::info!("Download complete: {}", target.display());
        Ok(target)
    }
}

fn set_bearer(request: &mut Request, token: &str) -> Result<()> {
    let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| BatchAppsError::Auth(format!("Invalid access token: {}", e)))?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Map a failed response to an error
async fn status_error(response: Response) -> BatchAppsError {
    let status = response.status().as_u16();
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();

    let err = match status {
        400 => BatchAppsError::BadRequest(format!(
            "Invalid API request. Some of the supplied data is incorrect or malformed.\n\
             Status 400.\nServer: {}",
            body
        )),
        401 => BatchAppsError::Unauthorized(
            "Authentication for this call failed, please check your credentials".to_string(),
        ),
        403 => BatchAppsError::NotApplicable(format!("API call non-applicable.\nServer: {}", body)),
        404 => BatchAppsError::NotFound(format!(
            "Invalid endpoint or api call. Failed with status 404.\nUrl: {}",
            url
        )),
        _ => BatchAppsError::Status {
            status,
            message: format!("Call failed with status: {}", status),
        },
    };

    if err.is_not_applicable() {
        tracing::debug!("{}", err);
    } else {
        tracing::error!(status, url = %url, response_body = %body, "{}", err);
    }
    err
}

// Simple random fraction for jitter
fn jitter_fraction() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    std::time::SystemTime::now().hash(&mut hasher);
    (hasher.finish() % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use tempfile::TempDir;

    fn client() -> BatchAppsHttpClient {
        let auth_manager =
            Arc::new(AuthManager::new_for_testing("test-token".to_string(), 300).unwrap());
        BatchAppsHttpClient::with_defaults(auth_manager)
            .unwrap()
            .with_retry_policy(2, 1)
    }

    #[test]
    fn test_backoff_calculation() {
        let client = client().with_retry_policy(3, 1000);

        let delay0 = client.calculate_backoff_delay(0);
        let delay1 = client.calculate_backoff_delay(1);
        let delay2 = client.calculate_backoff_delay(2);

        assert!((1000..=1100).contains(&delay0));
        assert!((2000..=2200).contains(&delay1));
        assert!((4000..=4400).contains(&delay2));
    }

    #[tokio::test]
    async fn test_get_json_sends_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/jobs")
            .match_header("authorization", "Bearer test-token")
            .match_header("accept", "application/json")
            .match_header("x-ms-version", API_VERSION)
            .match_query(Matcher::UrlEncoded("maxResults".into(), "10".into()))
            .with_status(200)
            .with_body(r#"{"totalCount": 0, "jobs": []}"#)
            .create_async()
            .await;

        let value = client()
            .get_json(
                &format!("{}/api/jobs", server.url()),
                &[("maxResults", "10".to_string())],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(value["totalCount"], 0);
    }

    #[tokio::test]
    async fn test_get_json_invalid_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/x")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client()
            .get_json(&format!("{}/x", server.url()), &[])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid response: No json object to be decoded from GET call."
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bad")
            .with_status(400)
            .with_body("missing name")
            .create_async()
            .await;
        server.mock("GET", "/forbidden").with_status(403).with_body("done").create_async().await;
        server.mock("GET", "/missing").with_status(404).create_async().await;
        server.mock("GET", "/conflict").with_status(409).create_async().await;

        let client = client();
        let err = client.get_json(&format!("{}/bad", server.url()), &[]).await.unwrap_err();
        assert!(matches!(err, BatchAppsError::BadRequest(_)));
        assert!(err.to_string().ends_with("Status 400.\nServer: missing name"));

        let err = client.get_json(&format!("{}/forbidden", server.url()), &[]).await.unwrap_err();
        assert!(err.is_not_applicable());
        assert_eq!(err.to_string(), "API call non-applicable.\nServer: done");

        let err = client.get_json(&format!("{}/missing", server.url()), &[]).await.unwrap_err();
        assert!(err.to_string().starts_with("Invalid endpoint or api call. Failed with status 404."));

        let err = client.get_json(&format!("{}/conflict", server.url()), &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.to_string(), "Call failed with status: 409");
    }

    #[tokio::test]
    async fn test_server_errors_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/busy")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let err = client()
            .get_json(&format!("{}/busy", server.url()), &[])
            .await
            .unwrap_err();
        mock.assert_async().await;
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"token_type":"Bearer","access_token":"fresh","expires_in":3600}"#)
            .create_async()
            .await;
        let rejected = server
            .mock("GET", "/jobs")
            .match_header("authorization", "Bearer test-token")
            .with_status(401)
            .create_async()
            .await;
        let accepted = server
            .mock("GET", "/jobs")
            .match_header("authorization", "Bearer fresh")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let auth_manager = Arc::new(
            AuthManager::new_for_testing("test-token".to_string(), 300)
                .unwrap()
                .with_token_url(format!("{}/token", server.url())),
        );
        let client = BatchAppsHttpClient::with_defaults(auth_manager).unwrap();
        client.get_json(&format!("{}/jobs", server.url()), &[]).await.unwrap();

        token_mock.assert_async().await;
        rejected.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_after_failed_refresh() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/jobs").with_status(401).expect(1).create_async().await;

        let err = client()
            .get_json(&format!("{}/jobs", server.url()), &[])
            .await
            .unwrap_err();
        mock.assert_async().await;
        assert!(matches!(err, BatchAppsError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_post_empty_body_is_null() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/jobs/1/actions/cancel")
            .with_status(202)
            .create_async()
            .await;

        let value = client()
            .post_json(&format!("{}/api/jobs/1/actions/cancel", server.url()), None)
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_head_content_length() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/file")
            .with_status(200)
            .with_header("content-length", "1234")
            .with_body("x".repeat(1234))
            .create_async()
            .await;

        let size = client()
            .head_content_length(&format!("{}/file", server.url()))
            .await
            .unwrap();
        assert_eq!(size, 1234);
    }

    #[tokio::test]
    async fn test_put_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scene.blend");
        std::fs::write(&path, b"data").unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/files/scene.blend")
            .match_header("content-type", "application/octet-stream")
            .match_query(Matcher::UrlEncoded("ContentLength".into(), "4".into()))
            .match_body("data")
            .with_status(200)
            .create_async()
            .await;

        client()
            .put_file(
                &format!("{}/api/files/scene.blend", server.url()),
                &path,
                &[("ContentLength", "4".to_string())],
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_missing_file() {
        let err = client()
            .put_file("http://127.0.0.1:1/x", Path::new("/no/such/file"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BatchAppsError::Io(_)));
    }

    #[tokio::test]
    async fn test_download_and_overwrite() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/outputs/my%20output.zip")
            .with_status(200)
            .with_body("zipdata")
            .expect(1)
            .create_async()
            .await;

        let client = client();
        let url = format!("{}/outputs/my%20output.zip", server.url());
        let path = client.download(&url, dir.path(), 7, false, None, None).await.unwrap();
        assert_eq!(path, dir.path().join("my output.zip"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "zipdata");

        // Existing file is kept without another request
        client.download(&url, dir.path(), 7, false, None, None).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_download_stays_in_output_dir() {
        let root = TempDir::new().unwrap();
        let out = root.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_body("payload")
            .expect(0)
            .create_async()
            .await;

        let client = client();
        let url = format!("{}/outputs/output", server.url());
        let err = client
            .download(&url, &out, 7, false, Some("../escaped.txt"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchAppsError::FileDownload(_)));

        let absolute = root.path().join("absolute.txt");
        let absolute = absolute.to_string_lossy().to_string();
        assert!(client
            .download(&url, &out, 7, false, Some(absolute.as_str()), None)
            .await
            .is_err());

        // Encoded separators in the url are decoded before the check
        let encoded = format!("{}/outputs/..%2Fencoded.txt", server.url());
        assert!(client.download(&encoded, &out, 7, false, None, None).await.is_err());

        assert!(!root.path().join("escaped.txt").exists());
        assert!(!root.path().join("absolute.txt").exists());
        assert!(!root.path().join("encoded.txt").exists());
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
        mock.assert_async().await;
    }
}
