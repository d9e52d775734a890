//! # Job Tracker
//!
//! Keeps every conversion job the user can see in sync with the server.
//!
//! ## Overview
//!
//! Each tracked job gets its own task running the [`MetadataSynchronizer`]
//! over the `conversion/{id}` push topic and `GET /api/jobs/{id}/`, with the
//! long job polling ceiling. Progress and terminal results go through the
//! transitions on [`ConversionJob`] under the collection lock.
//!
//! Terminal jobs stay visible until [`remove`](JobTracker::remove) but drop
//! out of [`active_ids`](JobTracker::active_ids).
//!
//! ## Cancellation
//!
//! [`cancel`](JobTracker::cancel) asks the server first. Only an accepted
//! request marks the job `Cancelled` and stops its sync task; a rejected one
//! leaves the job untouched and returns the server's reason.

use core_async::sync::{watch, CancellationToken, RwLock};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, JobEvent};
use core_sync::{MetadataSynchronizer, SyncError, SyncProgress};
use provider_backend::{BackendConnector, JobOptions};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{JobError, Result};
use crate::job::ConversionJob;
use crate::source::{JobOutcome, JobSource};

struct Tracked {
    job: ConversionJob,
    cancel: CancellationToken,
    order: u64,
}

pub struct JobTracker {
    connector: BackendConnector,
    synchronizer: MetadataSynchronizer,
    event_bus: Arc<EventBus>,
    jobs: Arc<RwLock<HashMap<String, Tracked>>>,
    next_order: Arc<AtomicU64>,
    snapshots: Arc<watch::Sender<Vec<ConversionJob>>>,
    shutdown: CancellationToken,
}

impl JobTracker {
    pub fn new(
        connector: BackendConnector,
        synchronizer: MetadataSynchronizer,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        Self {
            connector,
            synchronizer,
            event_bus,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_order: Arc::new(AtomicU64::new(0)),
            snapshots: Arc::new(snapshots),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_config(
        config: &CoreConfig,
        connector: BackendConnector,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let synchronizer = MetadataSynchronizer::from_config(config, config.job_polling.clone());
        Self::new(connector, synchronizer, event_bus)
    }

    fn clone_for_task(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            synchronizer: self.synchronizer.clone(),
            event_bus: Arc::clone(&self.event_bus),
            jobs: Arc::clone(&self.jobs),
            next_order: Arc::clone(&self.next_order),
            snapshots: Arc::clone(&self.snapshots),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Start tracking `job`. Returns `false` if a job with that id is
    /// already tracked.
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn track(&self, job: ConversionJob) -> bool {
        let id = job.id.clone();
        let source_file_id = job.source_file_id.clone();
        let needs_sync = !job.is_terminal();
        let cancel = self.shutdown.child_token();

        {
            let mut jobs = self.jobs.write().await;
            if jobs.contains_key(&id) {
                debug!("Job already tracked");
                return false;
            }
            jobs.insert(
                id.clone(),
                Tracked {
                    job,
                    cancel: cancel.clone(),
                    order: self.next_order.fetch_add(1, Ordering::SeqCst),
                },
            );
            self.publish(&jobs);
        }

        self.event_bus
            .emit(CoreEvent::Job(JobEvent::Tracked {
                job_id: id.clone(),
                source_file_id,
            }))
            .ok();

        if needs_sync {
            let tracker = self.clone_for_task();
            core_async::task::spawn(async move {
                tracker.run_sync(id, cancel).await;
            });
        }
        true
    }

    /// Create a conversion job for an uploaded file and track it.
    #[instrument(skip(self, options))]
    pub async fn create_from_file(&self, file_id: &str, options: &JobOptions) -> Result<String> {
        let resource = self.connector.create_job(file_id, options).await?;
        let job = ConversionJob::from_resource(resource, Some(file_id.to_string()));
        let id = job.id.clone();

        self.track(job).await;
        info!(job_id = %id, "Conversion job created");
        Ok(id)
    }

    /// Ask the server to cancel a job.
    ///
    /// # Errors
    ///
    /// - `JobError::NotFound` for an untracked job
    /// - `JobError::InvalidStateTransition` if the job already ended
    /// - `JobError::Api` when the server refuses; the job is unchanged
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: &str) -> Result<ConversionJob> {
        {
            let jobs = self.jobs.read().await;
            let tracked = jobs
                .get(job_id)
                .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
            if tracked.job.is_terminal() {
                return Err(JobError::InvalidStateTransition {
                    from: tracked.job.status.to_string(),
                    to: "cancelled".to_string(),
                });
            }
        }

        match self.connector.cancel_job(job_id).await {
            Ok(detail) => debug!(%detail, "Cancel accepted"),
            Err(e) => {
                warn!(error = %e, "Cancel rejected");
                self.event_bus
                    .emit(CoreEvent::Job(JobEvent::CancelRejected {
                        job_id: job_id.to_string(),
                        message: e.message().to_string(),
                    }))
                    .ok();
                return Err(e.into());
            }
        }

        match self.update(job_id, ConversionJob::cancel).await {
            Some(job) => {
                self.stop_sync(job_id).await;
                info!("Job cancelled");
                self.event_bus
                    .emit(CoreEvent::Job(JobEvent::Cancelled {
                        job_id: job_id.to_string(),
                    }))
                    .ok();
                Ok(job)
            }
            // Removed or finished while the request was in flight.
            None => self
                .get(job_id)
                .await
                .ok_or_else(|| JobError::NotFound(job_id.to_string())),
        }
    }

    /// Track every job the server reports as active plus `local_ids`.
    ///
    /// Returns the union of both id sets. A failed server listing is
    /// logged and the local ids are still tracked.
    #[instrument(skip_all)]
    pub async fn bootstrap<I>(&self, local_ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let server_jobs = match self.connector.list_active_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "Could not list active jobs");
                Vec::new()
            }
        };

        let mut ids = BTreeSet::new();
        for resource in server_jobs {
            if ids.insert(resource.id.clone()) {
                self.track(ConversionJob::from_resource(resource, None)).await;
            }
        }
        for id in local_ids {
            if ids.insert(id.clone()) {
                self.track(ConversionJob::new(id)).await;
            }
        }

        info!(count = ids.len(), "Jobs bootstrapped");
        ids.into_iter().collect()
    }

    /// Stop tracking a job. The server job is not touched.
    #[instrument(skip(self))]
    pub async fn remove(&self, job_id: &str) -> Result<ConversionJob> {
        let tracked = {
            let mut jobs = self.jobs.write().await;
            let tracked = jobs
                .remove(job_id)
                .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
            self.publish(&jobs);
            tracked
        };
        tracked.cancel.cancel();

        self.event_bus
            .emit(CoreEvent::Job(JobEvent::Removed {
                job_id: job_id.to_string(),
            }))
            .ok();
        Ok(tracked.job)
    }

    pub async fn get(&self, job_id: &str) -> Option<ConversionJob> {
        self.jobs.read().await.get(job_id).map(|t| t.job.clone())
    }

    /// All tracked jobs in the order they were first tracked.
    pub async fn list(&self) -> Vec<ConversionJob> {
        snapshot(&*self.jobs.read().await)
    }

    /// Ids of jobs that have not reached a terminal status.
    pub async fn active_ids(&self) -> Vec<String> {
        snapshot(&*self.jobs.read().await)
            .into_iter()
            .filter(|job| !job.is_terminal())
            .map(|job| job.id)
            .collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ConversionJob>> {
        self.snapshots.subscribe()
    }

    /// Stop every sync task. Jobs keep their last state.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn publish(&self, jobs: &HashMap<String, Tracked>) {
        self.snapshots.send_replace(snapshot(jobs));
    }

    async fn stop_sync(&self, job_id: &str) {
        if let Some(tracked) = self.jobs.read().await.get(job_id) {
            tracked.cancel.cancel();
        }
    }

    /// Apply `transition` if the job is still tracked and the transition
    /// changes it.
    async fn update<F>(&self, job_id: &str, transition: F) -> Option<ConversionJob>
    where
        F: FnOnce(ConversionJob) -> Result<ConversionJob>,
    {
        let mut jobs = self.jobs.write().await;
        let Some(tracked) = jobs.get_mut(job_id) else {
            debug!(job_id, "Update for removed job dropped");
            return None;
        };

        match transition(tracked.job.clone()) {
            Ok(next) if next == tracked.job => None,
            Ok(next) => {
                tracked.job = next.clone();
                self.publish(&jobs);
                Some(next)
            }
            Err(e) => {
                debug!(job_id, error = %e, "Transition rejected");
                None
            }
        }
    }

    #[instrument(skip(self, cancel))]
    async fn run_sync(&self, job_id: String, cancel: CancellationToken) {
        let source = JobSource::new(self.connector.clone(), job_id.clone());
        let id = job_id.as_str();
        let outcome = self
            .synchronizer
            .run_with(
                &source,
                move |progress| self.apply_progress(id, progress),
                &cancel,
            )
            .await;

        match outcome {
            Ok(JobOutcome::Completed) => {
                if self.update(id, ConversionJob::complete).await.is_some() {
                    info!("Job completed");
                    self.event_bus
                        .emit(CoreEvent::Job(JobEvent::Completed {
                            job_id: job_id.clone(),
                        }))
                        .ok();
                }
            }
            Ok(JobOutcome::Cancelled) => {
                if self.update(id, ConversionJob::cancel).await.is_some() {
                    info!("Job cancelled on server");
                    self.event_bus
                        .emit(CoreEvent::Job(JobEvent::Cancelled {
                            job_id: job_id.clone(),
                        }))
                        .ok();
                }
            }
            Err(SyncError::Cancelled) => {}
            Err(e) => {
                let message = e.to_string();
                let failed = message.clone();
                if self.update(id, move |job| job.fail(failed)).await.is_some() {
                    warn!(%message, "Job failed");
                    self.event_bus
                        .emit(CoreEvent::Job(JobEvent::Failed {
                            job_id: job_id.clone(),
                            message,
                        }))
                        .ok();
                }
            }
        }
    }

    async fn apply_progress(&self, job_id: &str, progress: SyncProgress) {
        let Some(job) = self.update(job_id, |job| job.apply_progress(&progress)).await else {
            return;
        };
        self.event_bus
            .emit(CoreEvent::Job(JobEvent::Progress {
                job_id: job.id,
                status: job.status.to_string(),
                percent: job.progress,
                stage: job.stage,
                eta_seconds: job.eta_seconds,
            }))
            .ok();
    }
}

fn snapshot(jobs: &HashMap<String, Tracked>) -> Vec<ConversionJob> {
    let mut tracked: Vec<&Tracked> = jobs.values().collect();
    tracked.sort_by_key(|t| t.order);
    tracked.into_iter().map(|t| t.job.clone()).collect()
}
