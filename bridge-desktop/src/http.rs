//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy, UploadRequest},
};
use core_async::time::sleep;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("mkv2cast-client/", env!("CARGO_PKG_VERSION"));

/// Reqwest-based HTTP client.
///
/// `execute` performs exactly one attempt and hands back whatever status the
/// server returned. `execute_with_retry` retries transport failures, 5xx and
/// 429 with the policy's backoff. Uploads are never retried.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a client with a 30 second request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a client with a custom request timeout.
    ///
    /// Uploads override this per request since large files outlive it.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn map_transport_error(err: reqwest::Error) -> BridgeError {
        if err.is_timeout() {
            BridgeError::Network("request timed out".to_string())
        } else if err.is_connect() {
            BridgeError::Network(format!("connection failed: {err}"))
        } else {
            BridgeError::Network(err.to_string())
        }
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let body = response.bytes().await.map_err(Self::map_transport_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn is_retryable_status(status: u16) -> bool {
        status >= 500 || status == 429
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(method = ?request.method, "Executing HTTP request");
        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        Self::into_response(response).await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = self.execute(request.clone()).await;

            let retryable = match &outcome {
                Ok(response) => Self::is_retryable_status(response.status),
                Err(err) => err.is_transport(),
            };

            if !retryable || attempt >= max_attempts {
                return outcome;
            }

            match &outcome {
                Ok(response) => warn!(
                    status = response.status,
                    attempt,
                    "HTTP request failed with retryable status"
                ),
                Err(err) => warn!(error = %err, attempt, "HTTP request failed"),
            }

            let delay = policy.delay_for(attempt);
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
        }
    }

    async fn upload_stream(&self, request: UploadRequest) -> Result<HttpResponse> {
        debug!(content_length = request.content_length, "Starting streamed upload");

        let mut req = self
            .client
            .put(&request.url)
            .header(reqwest::header::CONTENT_LENGTH, request.content_length)
            .timeout(Duration::from_secs(6 * 60 * 60))
            .body(reqwest::Body::wrap_stream(request.body));

        if let Some(content_type) = request.content_type {
            req = req.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        let response = req.send().await.map_err(Self::map_transport_error)?;
        Self::into_response(response).await
    }
}
