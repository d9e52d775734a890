//! # Core Configuration Module
//!
//! `CoreConfig` carries every bridge and tuning knob the client core needs.
//! It is built once at startup with [`CoreConfigBuilder`], validated, and
//! handed to `CoreService`.
//!
//! ## Required
//!
//! - `api_base_url` - backend root, e.g. `https://mkv2cast.example`
//! - `HttpClient` - desktop default: reqwest
//!
//! ## Optional
//!
//! - `PushChannel` - desktop default: WebSocket at `push_base_url`, or the
//!   API host with `ws(s)://` and `/ws`
//! - `Clock` - defaults to `SystemClock`
//! - `auth_token` - sent as a bearer token
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, PollConfig};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .api_base_url("https://mkv2cast.example")
//!     .auth_token(token)
//!     .polling(PollConfig::default().with_base_interval(Duration::from_secs(3)))
//!     .build()?;
//! ```
//!
//! Missing bridges fail fast with an actionable message:
//!
//! ```
//! use core_runtime::config::CoreConfig;
//!
//! let err = CoreConfig::builder().build().unwrap_err();
//! assert!(err.to_string().contains("api_base_url"));
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, PushChannel, SystemClock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Tuning sections
// ============================================================================

/// Upload pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Bytes per body chunk; progress is reported at most once per chunk.
    pub chunk_size: usize,
    /// Wall-clock budget for the local pre-analysis probe.
    pub pre_analysis_timeout: Duration,
    /// Leading bytes read for the local probe.
    pub probe_head_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256 * 1024,
            pre_analysis_timeout: Duration::from_secs(10),
            probe_head_bytes: 1024 * 1024,
        }
    }
}

impl UploadConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_pre_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.pre_analysis_timeout = timeout;
        self
    }

    pub fn with_probe_head_bytes(mut self, bytes: usize) -> Self {
        self.probe_head_bytes = bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("Upload chunk size must be greater than 0".to_string()));
        }
        if self.pre_analysis_timeout.is_zero() {
            return Err(Error::Config(
                "Pre-analysis timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pull-channel (polling) parameters.
///
/// `max_attempts` counts scheduled polls, not wall time. Backoff after
/// `n` consecutive errors is `min(base_interval * multiplier^n, max_backoff)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub base_interval: Duration,
    pub max_attempts: u32,
    pub error_threshold: u32,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(5000),
            max_attempts: 60,
            error_threshold: 3,
            backoff_multiplier: 1.5,
            max_backoff: Duration::from_millis(30_000),
        }
    }
}

impl PollConfig {
    /// Polling for conversion jobs, which run far longer than analysis.
    pub fn for_jobs() -> Self {
        Self {
            max_attempts: 720,
            ..Self::default()
        }
    }

    pub fn with_base_interval(mut self, interval: Duration) -> Self {
        self.base_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = threshold;
        self
    }

    pub fn with_backoff(mut self, multiplier: f64, max_backoff: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_backoff = max_backoff;
        self
    }

    /// Delay before the next poll given the current consecutive error count.
    pub fn delay_after(&self, consecutive_errors: u32) -> Duration {
        if consecutive_errors == 0 {
            return self.base_interval.min(self.max_backoff);
        }
        let factor = self
            .backoff_multiplier
            .powi(consecutive_errors.min(i32::MAX as u32) as i32);
        let millis = self.base_interval.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.round() as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_interval.is_zero() {
            return Err(Error::Config("Poll interval must be greater than 0".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("Poll max_attempts must be at least 1".to_string()));
        }
        if self.error_threshold == 0 {
            return Err(Error::Config(
                "Poll error_threshold must be at least 1".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::Config(
                "Poll backoff_multiplier must be a finite value >= 1.0".to_string(),
            ));
        }
        if self.max_backoff < self.base_interval {
            return Err(Error::Config(
                "Poll max_backoff must not be shorter than base_interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// Dual-channel synchronization settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Run the poll loop from the start even while the push channel is healthy.
    /// When false, polling starts only after a push failure.
    pub poll_alongside_push: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_alongside_push: true,
        }
    }
}

/// Telemetry coordinator scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Floor for the effective cadence.
    pub min_cadence: Duration,
    /// Extra fetches after the immediate first one.
    pub burst_fetches: u32,
    /// Spacing of the burst fetches.
    pub burst_spacing: Duration,
    /// Per-request timeout for a monitoring fetch.
    pub fetch_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            min_cadence: Duration::from_millis(1000),
            burst_fetches: 2,
            burst_spacing: Duration::from_millis(1000),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_cadence.is_zero() {
            return Err(Error::Config(
                "Telemetry min_cadence must be greater than 0".to_string(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(Error::Config(
                "Telemetry fetch_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Subscribe to server push for files and jobs (requires a PushChannel).
    pub enable_push_channel: bool,
    /// Run the local pre-analysis probe on selected files.
    pub enable_local_probe: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_push_channel: true,
            enable_local_probe: true,
        }
    }
}

// ============================================================================
// CoreConfig
// ============================================================================

#[derive(Clone)]
pub struct CoreConfig {
    /// Backend root URL without trailing slash.
    pub api_base_url: String,
    /// WebSocket root used by the default push channel.
    pub push_base_url: Option<String>,
    pub auth_token: Option<String>,
    pub http_client: Arc<dyn HttpClient>,
    pub push_channel: Option<Arc<dyn PushChannel>>,
    pub clock: Arc<dyn Clock>,
    pub upload: UploadConfig,
    pub polling: PollConfig,
    pub job_polling: PollConfig,
    pub sync: SyncConfig,
    pub telemetry: TelemetryConfig,
    pub features: FeatureFlags,
    pub event_buffer_size: usize,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("api_base_url", &self.api_base_url)
            .field("push_base_url", &self.push_base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("http_client", &"HttpClient { ... }")
            .field(
                "push_channel",
                &self.push_channel.as_ref().map(|_| "PushChannel { ... }"),
            )
            .field("upload", &self.upload)
            .field("polling", &self.polling)
            .field("job_polling", &self.job_polling)
            .field("sync", &self.sync)
            .field("telemetry", &self.telemetry)
            .field("features", &self.features)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "api_base_url must start with http:// or https:// (got '{}')",
                self.api_base_url
            )));
        }

        if self.features.enable_push_channel && self.push_channel.is_none() {
            return Err(Error::Config(
                "Push channel enabled but no PushChannel provided. \
                 Disable the feature or inject a PushChannel implementation."
                    .to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config("Event buffer size must be greater than 0".to_string()));
        }

        self.upload.validate()?;
        self.polling.validate()?;
        self.job_polling.validate()?;
        self.telemetry.validate()?;

        Ok(())
    }
}

/// Derive the WebSocket root from the API root: scheme swapped, `/ws` appended.
pub fn default_push_base_url(api_base_url: &str) -> String {
    let trimmed = api_base_url.trim_end_matches('/');
    let swapped = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        trimmed.to_string()
    };
    format!("{swapped}/ws")
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {e}")))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for backend calls and uploads. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Other hosts: inject a platform HTTP adapter."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_push_channel(
    push_base_url: &str,
    auth_token: Option<&str>,
) -> Option<Arc<dyn PushChannel>> {
    use bridge_desktop::WebSocketPushChannel;

    let mut channel = WebSocketPushChannel::new(push_base_url);
    if let Some(token) = auth_token {
        channel = channel.with_auth_token(token);
    }
    Some(Arc::new(channel))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_push_channel(
    _push_base_url: &str,
    _auth_token: Option<&str>,
) -> Option<Arc<dyn PushChannel>> {
    None
}

#[derive(Default)]
pub struct CoreConfigBuilder {
    api_base_url: Option<String>,
    push_base_url: Option<String>,
    auth_token: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    push_channel: Option<Arc<dyn PushChannel>>,
    clock: Option<Arc<dyn Clock>>,
    upload: Option<UploadConfig>,
    polling: Option<PollConfig>,
    job_polling: Option<PollConfig>,
    sync: Option<SyncConfig>,
    telemetry: Option<TelemetryConfig>,
    features: FeatureFlags,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn push_base_url(mut self, url: impl Into<String>) -> Self {
        self.push_base_url = Some(url.into());
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn push_channel(mut self, channel: Arc<dyn PushChannel>) -> Self {
        self.push_channel = Some(channel);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn upload(mut self, upload: UploadConfig) -> Self {
        self.upload = Some(upload);
        self
    }

    pub fn polling(mut self, polling: PollConfig) -> Self {
        self.polling = Some(polling);
        self
    }

    pub fn job_polling(mut self, polling: PollConfig) -> Self {
        self.job_polling = Some(polling);
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn enable_push_channel(mut self, enabled: bool) -> Self {
        self.features.enable_push_channel = enabled;
        self
    }

    pub fn enable_local_probe(mut self, enabled: bool) -> Self {
        self.features.enable_local_probe = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn build(self) -> Result<CoreConfig> {
        let api_base_url = self
            .api_base_url
            .ok_or_else(|| {
                Error::Config(
                    "api_base_url is required. Use .api_base_url() to set it.".to_string(),
                )
            })?
            .trim_end_matches('/')
            .to_string();

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let push_base_url = self.push_base_url;
        let push_channel = match self.push_channel {
            Some(channel) => Some(channel),
            None if self.features.enable_push_channel => {
                let base = push_base_url
                    .clone()
                    .unwrap_or_else(|| default_push_base_url(&api_base_url));
                provide_default_push_channel(&base, self.auth_token.as_deref())
            }
            None => None,
        };

        let config = CoreConfig {
            api_base_url,
            push_base_url,
            auth_token: self.auth_token,
            http_client,
            push_channel,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            upload: self.upload.unwrap_or_default(),
            polling: self.polling.unwrap_or_default(),
            job_polling: self.job_polling.unwrap_or_else(PollConfig::for_jobs),
            sync: self.sync.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
            features: self.features,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{HttpRequest, HttpResponse, PushSubscription, UploadRequest};

    struct StubHttpClient;

    #[async_trait]
    impl HttpClient for StubHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse::new(200, "{}"))
        }

        async fn upload_stream(&self, _request: UploadRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse::new(200, ""))
        }
    }

    struct StubPushChannel;

    #[async_trait]
    impl PushChannel for StubPushChannel {
        async fn subscribe(&self, topic: &str) -> BridgeResult<PushSubscription> {
            let (_tx, rx) = core_async::sync::mpsc::channel(1);
            Ok(PushSubscription::from_receiver(topic, rx))
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .api_base_url("https://mkv2cast.example/")
            .http_client(Arc::new(StubHttpClient))
            .push_channel(Arc::new(StubPushChannel))
    }

    #[test]
    fn test_builder_requires_api_base_url() {
        let err = CoreConfig::builder()
            .http_client(Arc::new(StubHttpClient))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("api_base_url is required"));
    }

    #[test]
    fn test_builder_applies_defaults() {
        let config = builder().build().unwrap();

        assert_eq!(config.api_base_url, "https://mkv2cast.example");
        assert_eq!(config.polling, PollConfig::default());
        assert_eq!(config.job_polling.max_attempts, 720);
        assert_eq!(config.upload.pre_analysis_timeout, Duration::from_secs(10));
        assert_eq!(config.telemetry.min_cadence, Duration::from_millis(1000));
        assert!(config.sync.poll_alongside_push);
        assert!(config.features.enable_local_probe);
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let err = CoreConfig::builder()
            .api_base_url("ftp://host")
            .http_client(Arc::new(StubHttpClient))
            .push_channel(Arc::new(StubPushChannel))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http:// or https://"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_http_client_is_capability_error() {
        let err = CoreConfig::builder()
            .api_base_url("https://mkv2cast.example")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::CapabilityMissing { .. }));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_push_enabled_without_channel_is_rejected() {
        let err = CoreConfig::builder()
            .api_base_url("https://mkv2cast.example")
            .http_client(Arc::new(StubHttpClient))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("no PushChannel provided"));
    }

    #[test]
    fn test_push_disabled_needs_no_channel() {
        let config = CoreConfig::builder()
            .api_base_url("https://mkv2cast.example")
            .http_client(Arc::new(StubHttpClient))
            .enable_push_channel(false)
            .build()
            .unwrap();
        assert!(config.push_channel.is_none());
    }

    #[test]
    fn test_invalid_polling_is_rejected() {
        let err = builder()
            .polling(PollConfig::default().with_backoff(0.5, Duration::from_secs(30)))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("backoff_multiplier"));

        let err = builder()
            .polling(PollConfig::default().with_max_attempts(0))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_poll_backoff_curve() {
        let polling = PollConfig::default();

        assert_eq!(polling.delay_after(0), Duration::from_millis(5000));
        assert_eq!(polling.delay_after(1), Duration::from_millis(7500));
        assert_eq!(polling.delay_after(2), Duration::from_millis(11250));
        assert_eq!(polling.delay_after(5), Duration::from_millis(30_000));
        assert_eq!(polling.delay_after(50), Duration::from_millis(30_000));
    }

    #[test]
    fn test_default_push_base_url() {
        assert_eq!(
            default_push_base_url("https://mkv2cast.example/"),
            "wss://mkv2cast.example/ws"
        );
        assert_eq!(
            default_push_base_url("http://localhost:8000"),
            "ws://localhost:8000/ws"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = builder().auth_token("secret-token").build().unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
