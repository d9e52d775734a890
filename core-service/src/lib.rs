//! Core service façade and bootstrap helpers.
//!
//! [`CoreService`] builds every service from one [`CoreConfig`] and shares a
//! single event bus and backend connector between them:
//!
//! - [`PendingFileOrchestrator`]: file selection, upload and analysis
//! - [`JobTracker`]: conversion jobs
//! - [`TelemetryCoordinator`]: host metrics for monitoring views
//!
//! Desktop hosts enable the `desktop-shims` feature and call
//! [`bootstrap_desktop`]; other hosts inject their own bridges through
//! [`CoreConfig::builder`].

pub mod error;

pub use error::{CoreError, Result};

pub use bridge_traits::{FileSource, HttpClient, InMemoryFile, PushChannel};
pub use core_jobs::{ConversionJob, JobStatus, JobTracker};
pub use core_runtime::config::CoreConfig;
pub use core_runtime::events::{CoreEvent, EventBus};
pub use core_telemetry::{SubscriberRequest, Subscription, TelemetryCoordinator};
pub use core_upload::{FileStatus, LocalFileId, MediaMetadata, PendingFile, PendingFileOrchestrator};
pub use provider_backend::JobOptions;

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::LocalFileSource;

use core_runtime::events::Receiver;
use provider_backend::BackendConnector;
use std::sync::Arc;
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    event_bus: Arc<EventBus>,
    uploads: Arc<PendingFileOrchestrator>,
    jobs: Arc<JobTracker>,
    telemetry: TelemetryCoordinator,
}

impl CoreService {
    /// Build all services. Must be called inside a Tokio runtime.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let mut connector =
            BackendConnector::new(Arc::clone(&config.http_client), config.api_base_url.clone());
        if let Some(token) = &config.auth_token {
            connector = connector.with_auth_token(token.clone());
        }

        let uploads =
            PendingFileOrchestrator::from_config(&config, connector.clone(), Arc::clone(&event_bus));
        let jobs = JobTracker::from_config(&config, connector.clone(), Arc::clone(&event_bus));
        let telemetry = TelemetryCoordinator::from_config(&config, connector, Arc::clone(&event_bus));

        info!(
            api_base_url = %config.api_base_url,
            push = config.push_channel.is_some(),
            "Core service initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            event_bus,
            uploads: Arc::new(uploads),
            jobs: Arc::new(jobs),
            telemetry,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn uploads(&self) -> &PendingFileOrchestrator {
        &self.uploads
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    pub fn telemetry(&self) -> &TelemetryCoordinator {
        &self.telemetry
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Turn a `Ready` pending file into a conversion job.
    ///
    /// The file leaves the pending list only once the job exists, so a
    /// failed request can be retried.
    ///
    /// # Errors
    ///
    /// - `CoreError::NotReady` if the file is unknown or not `Ready`
    /// - `CoreError::Job` if the backend refuses the job
    #[instrument(skip(self, options))]
    pub async fn promote(&self, local_id: LocalFileId, options: &JobOptions) -> Result<String> {
        let server_id = match self.uploads.get(local_id).await {
            Some(PendingFile {
                status: FileStatus::Ready { .. },
                server_id: Some(server_id),
                ..
            }) => server_id,
            _ => return Err(CoreError::NotReady(local_id)),
        };

        let job_id = self.jobs.create_from_file(&server_id, options).await?;
        self.uploads.take_ready(local_id).await;

        info!(%job_id, file_id = %server_id, "File promoted to job");
        Ok(job_id)
    }

    /// Cancel every background task. State stays readable.
    pub fn shutdown(&self) {
        self.uploads.shutdown();
        self.jobs.shutdown();
    }
}

/// Build a service with the reqwest and WebSocket bridges.
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub fn bootstrap_desktop(
    api_base_url: impl Into<String>,
    auth_token: Option<String>,
) -> Result<CoreService> {
    let mut builder = CoreConfig::builder().api_base_url(api_base_url);
    if let Some(token) = auth_token {
        builder = builder.auth_token(token);
    }
    CoreService::new(builder.build()?)
}
