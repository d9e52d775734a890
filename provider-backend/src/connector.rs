//! mkv2cast REST API connector
//!
//! One method per endpoint the client core consumes. Every method returns
//! an [`ApiError`] already classified as transient, malformed or rejected,
//! so the sync and job layers decide on retries without looking at status
//! codes themselves.

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{ApiError, Result};
use crate::types::{
    ConfirmResponse, CreateJobRequest, DetailResponse, JobList, JobOptions, JobResource,
    MetadataPoll, MetadataResponse, MonitoringResource, PresignRequest, PresignResponse,
};

/// Per-request timeout for API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend API connector
///
/// Cheap to clone; all clones share the same `HttpClient`.
///
/// # Example
///
/// ```ignore
/// use provider_backend::BackendConnector;
///
/// let connector = BackendConnector::new(http_client, "https://mkv2cast.example")
///     .with_auth_token(token);
/// let target = connector.presign("movie.mkv", 524_288_000).await?;
/// ```
#[derive(Clone)]
pub struct BackendConnector {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    auth_token: Option<String>,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for BackendConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnector")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.auth_token.is_some())
            .finish()
    }
}

impl BackendConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Retry policy for idempotent listing calls.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Access to the underlying client for streamed uploads.
    pub fn http_client(&self) -> &Arc<dyn HttpClient> {
        &self.http_client
    }

    fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        let request = HttpRequest::new(method, format!("{}{}", self.base_url, path))
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        match &self.auth_token {
            Some(token) => request.bearer_token(token.clone()),
            None => request,
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.http_client.execute(request).await?;
        Self::check_status(response)
    }

    /// Map non-2xx statuses onto the error taxonomy.
    fn check_status(response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            return Ok(response);
        }

        let status = response.status;
        let detail: DetailResponse = response.json().unwrap_or_default();
        let message = detail
            .text()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}"));

        if status == 429 || response.is_server_error() {
            warn!(status, %message, "Backend returned retryable status");
            return Err(ApiError::Transient(message));
        }

        Err(ApiError::Rejected {
            status,
            code: detail.code.or(detail.status),
            message,
        })
    }

    fn parse<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
        response
            .json()
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }

    /// Ask for a presigned upload URL.
    #[instrument(skip(self))]
    pub async fn presign(&self, filename: &str, size: u64) -> Result<PresignResponse> {
        let request = self
            .request(HttpMethod::Post, "/api/upload/presigned/")
            .json(&PresignRequest { filename, size })
            .map_err(ApiError::from)?;

        let response = self.send(request).await?;
        let target: PresignResponse = Self::parse(&response)?;
        debug!(file_id = %target.file_id, expires_in = ?target.expires_in, "Presigned upload issued");
        Ok(target)
    }

    /// Tell the backend the upload finished; analysis starts server-side.
    #[instrument(skip(self))]
    pub async fn confirm_upload(&self, file_id: &str) -> Result<ConfirmResponse> {
        let request = self.request(HttpMethod::Post, &format!("/api/upload/{file_id}/complete/"));
        let response = self.send(request).await?;
        Self::parse(&response)
    }

    /// One metadata poll.
    ///
    /// 202 and non-ready 200 bodies are `Pending`; 400/404 are rejections
    /// carrying the server code (`analysis_failed`, `file_not_found`, ...).
    #[instrument(skip(self))]
    pub async fn poll_metadata(&self, file_id: &str) -> Result<MetadataPoll> {
        let request = self.request(HttpMethod::Get, &format!("/api/upload/{file_id}/metadata/"));
        let response = self.send(request).await?;
        let body: MetadataResponse = Self::parse(&response)?;

        if body.status == "ready" {
            let metadata = body.metadata.ok_or_else(|| {
                ApiError::Malformed("ready response without metadata".to_string())
            })?;
            return Ok(MetadataPoll::Ready {
                metadata,
                filename: body.filename,
                file_size: body.file_size,
            });
        }

        Ok(MetadataPoll::Pending {
            status: body.status,
            message: body.message,
            stage: body.stage,
            eta_seconds: body.eta_seconds,
            progress: body.progress,
        })
    }

    /// Create a conversion job from a ready pending file.
    #[instrument(skip(self, options))]
    pub async fn create_job(&self, file_id: &str, options: &JobOptions) -> Result<JobResource> {
        let request = self
            .request(HttpMethod::Post, "/api/jobs/create-from-file/")
            .json(&CreateJobRequest { file_id, options })
            .map_err(ApiError::from)?;

        let response = self.send(request).await?;
        Self::parse(&response)
    }

    #[instrument(skip(self))]
    pub async fn get_job(&self, job_id: &str) -> Result<JobResource> {
        let request = self.request(HttpMethod::Get, &format!("/api/jobs/{job_id}/"));
        let response = self.send(request).await?;
        Self::parse(&response)
    }

    /// Request cancellation. Returns the server's `detail` text.
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: &str) -> Result<String> {
        let request = self.request(HttpMethod::Post, &format!("/api/jobs/{job_id}/cancel/"));
        let response = self.send(request).await?;
        let detail: DetailResponse = response.json().unwrap_or_default();
        Ok(detail.text().unwrap_or("Job cancelled.").to_string())
    }

    /// Jobs the server still considers active.
    #[instrument(skip(self))]
    pub async fn list_active_jobs(&self) -> Result<Vec<JobResource>> {
        let request = self.request(HttpMethod::Get, "/api/jobs/active/");
        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?;
        let response = Self::check_status(response)?;
        let jobs: JobList = Self::parse(&response)?;
        Ok(jobs.into_vec())
    }

    /// Host metrics sample.
    pub async fn fetch_monitoring(&self) -> Result<MonitoringResource> {
        let request = self.request(HttpMethod::Get, "/api/monitoring/");
        let response = self.send(request).await?;
        Self::parse(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::UploadRequest;
    use mockall::mock;
    use serde_json::json;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn execute_with_retry(&self, request: HttpRequest, policy: RetryPolicy) -> BridgeResult<HttpResponse>;
            async fn upload_stream(&self, request: UploadRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn respond(status: u16, body: serde_json::Value) -> BridgeResult<HttpResponse> {
        Ok(HttpResponse::new(status, body.to_string()))
    }

    fn connector(mock_http: MockHttpClient) -> BackendConnector {
        BackendConnector::new(Arc::new(mock_http), "https://mkv2cast.example/")
            .with_auth_token("test_token")
    }

    #[tokio::test]
    async fn test_presign_success() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Post
                    && req.url == "https://mkv2cast.example/api/upload/presigned/"
                    && req.headers.get("Authorization").map(String::as_str)
                        == Some("Bearer test_token")
            })
            .times(1)
            .returning(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_deref().unwrap_or_default()).unwrap();
                assert_eq!(body, json!({"filename": "movie.mkv", "size": 1024}));
                respond(
                    200,
                    json!({
                        "file_id": "f-1",
                        "upload_url": "https://s3.example/bucket/f-1?sig=abc",
                        "key": "uploads/f-1.mkv",
                        "expires_in": 3600
                    }),
                )
            });

        let target = connector(mock_http).presign("movie.mkv", 1024).await.unwrap();

        assert_eq!(target.file_id, "f-1");
        assert_eq!(target.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn test_presign_rejection_carries_detail() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .returning(|_| respond(400, json!({"detail": "Only MKV files are supported."})));

        let err = connector(mock_http).presign("movie.avi", 10).await.unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(err.message(), "Only MKV files are supported.");
    }

    #[tokio::test]
    async fn test_poll_metadata_pending() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(|_| {
            respond(
                202,
                json!({"status": "analyzing", "message": "Analyzing file...", "stage": "probing", "eta_seconds": 12}),
            )
        });

        let poll = connector(mock_http).poll_metadata("f-1").await.unwrap();

        assert_eq!(
            poll,
            MetadataPoll::Pending {
                status: "analyzing".to_string(),
                message: Some("Analyzing file...".to_string()),
                stage: Some("probing".to_string()),
                eta_seconds: Some(12.0),
                progress: None,
            }
        );
    }

    #[tokio::test]
    async fn test_poll_metadata_ready() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(|_| {
            respond(
                200,
                json!({
                    "status": "ready",
                    "filename": "movie.mkv",
                    "file_size": 2048,
                    "metadata": {"video_codec": "h264", "duration": 3600.0}
                }),
            )
        });

        match connector(mock_http).poll_metadata("f-1").await.unwrap() {
            MetadataPoll::Ready { metadata, file_size, .. } => {
                assert_eq!(metadata.duration, Some(3600.0));
                assert_eq!(file_size, Some(2048));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_poll_metadata_analysis_failed_is_rejection() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(|_| {
            respond(
                400,
                json!({"status": "error", "code": "analysis_failed", "message": "Corrupt header"}),
            )
        });

        let err = connector(mock_http).poll_metadata("f-1").await.unwrap_err();

        assert_eq!(err.code(), Some("analysis_failed"));
        assert_eq!(err.message(), "Corrupt header");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .returning(|_| Ok(HttpResponse::new(503, "upstream down")));

        let err = connector(mock_http).get_job("j-1").await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.message(), "HTTP 503");
    }

    #[tokio::test]
    async fn test_network_failure_is_transient() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .returning(|_| Err(BridgeError::Network("connection refused".to_string())));

        let err = connector(mock_http).confirm_upload("f-1").await.unwrap_err();

        assert!(matches!(err, ApiError::Transient(_)));
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .returning(|_| Ok(HttpResponse::new(200, "<html>proxy login</html>")));

        let err = connector(mock_http).get_job("j-1").await.unwrap_err();

        assert!(matches!(err, ApiError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_cancel_not_cancellable() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| req.url.ends_with("/api/jobs/j-1/cancel/"))
            .returning(|_| {
                respond(400, json!({"detail": "Job cannot be cancelled in its current state."}))
            });

        let err = connector(mock_http).cancel_job("j-1").await.unwrap_err();

        assert!(err.is_rejected());
        assert!(err.message().contains("cannot be cancelled"));
    }

    #[tokio::test]
    async fn test_create_job_sends_options() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| req.url.ends_with("/api/jobs/create-from-file/"))
            .returning(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_deref().unwrap_or_default()).unwrap();
                assert_eq!(body["file_id"], "f-1");
                assert_eq!(body["options"], json!({"container": "mp4"}));
                respond(201, json!({"id": "j-9", "status": "queued"}))
            });

        let job = connector(mock_http)
            .create_job("f-1", &JobOptions::default().container("mp4"))
            .await
            .unwrap();

        assert_eq!(job.id, "j-9");
        assert_eq!(job.status, "queued");
    }

    #[tokio::test]
    async fn test_list_active_jobs_uses_retry() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().never();
        mock_http
            .expect_execute_with_retry()
            .withf(|req, policy| req.url.ends_with("/api/jobs/active/") && policy.max_attempts == 3)
            .times(1)
            .returning(|_, _| respond(200, json!([{"id": "j-1", "status": "processing"}])));

        let jobs = connector(mock_http).list_active_jobs().await.unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, "processing");
    }
}
