//! # Pending-File Orchestrator
//!
//! Owns the collection of [`PendingFile`]s and drives each one from
//! selection to `Ready` or `Error`.
//!
//! ## Workflow
//!
//! 1. Presign `(filename, size)` and record the server `file_id`
//! 2. Start the local probe (fire-and-forget) and the upload in parallel
//! 3. Confirm the upload once the channel resolves
//! 4. Run the [`MetadataSynchronizer`] until the analysis is terminal
//!
//! Every file runs in its own task with its own cancellation token. State
//! changes go through the pure transitions on [`PendingFile`] under the
//! collection lock, and a file that was removed meanwhile silently drops
//! the update.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = PendingFileOrchestrator::from_config(&config, connector, event_bus);
//! let id = orchestrator.select(Arc::new(LocalFileSource::open(path).await?)).await;
//!
//! let mut files = orchestrator.subscribe();
//! while files.changed().await.is_ok() {
//!     render(&files.borrow());
//! }
//! ```

use bridge_traits::FileSource;
use core_async::sync::{mpsc, watch, CancellationToken, RwLock};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, UploadEvent};
use core_sync::{MetadataSynchronizer, SyncError, SyncProgress};
use provider_backend::BackendConnector;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::channel::UploadChannel;
use crate::error::{Result, UploadError};
use crate::metadata::MediaMetadata;
use crate::pending::{AnalysisStage, FileStatus, LocalFileId, PendingFile};
use crate::probe::LocalPreAnalyzer;
use crate::source::FileMetadataSource;

struct Entry {
    file: PendingFile,
    cancel: CancellationToken,
}

pub struct PendingFileOrchestrator {
    connector: BackendConnector,
    channel: UploadChannel,
    /// `None` when local probing is disabled.
    analyzer: Option<LocalPreAnalyzer>,
    synchronizer: MetadataSynchronizer,
    event_bus: Arc<EventBus>,
    files: Arc<RwLock<HashMap<LocalFileId, Entry>>>,
    snapshots: Arc<watch::Sender<Vec<PendingFile>>>,
    shutdown: CancellationToken,
}

impl PendingFileOrchestrator {
    pub fn new(
        connector: BackendConnector,
        channel: UploadChannel,
        analyzer: Option<LocalPreAnalyzer>,
        synchronizer: MetadataSynchronizer,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        Self {
            connector,
            channel,
            analyzer,
            synchronizer,
            event_bus,
            files: Arc::new(RwLock::new(HashMap::new())),
            snapshots: Arc::new(snapshots),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_config(
        config: &CoreConfig,
        connector: BackendConnector,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let channel = UploadChannel::new(config.http_client.clone(), config.upload.chunk_size);
        let analyzer = config
            .features
            .enable_local_probe
            .then(|| LocalPreAnalyzer::new(&config.upload));
        let synchronizer = MetadataSynchronizer::from_config(config, config.polling.clone());
        Self::new(connector, channel, analyzer, synchronizer, event_bus)
    }

    fn clone_for_task(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            channel: self.channel.clone(),
            analyzer: self.analyzer.clone(),
            synchronizer: self.synchronizer.clone(),
            event_bus: Arc::clone(&self.event_bus),
            files: Arc::clone(&self.files),
            snapshots: Arc::clone(&self.snapshots),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Add a file and start its pipeline. Returns immediately.
    #[instrument(skip_all, fields(file = %source.name(), size = source.size()))]
    pub async fn select(&self, source: Arc<dyn FileSource>) -> LocalFileId {
        let file = PendingFile::new(source.name(), source.size());
        let id = file.local_id;
        let cancel = self.shutdown.child_token();

        self.event_bus
            .emit(CoreEvent::Upload(UploadEvent::Selected {
                file_id: id.to_string(),
                filename: file.filename.clone(),
                size_bytes: file.size_bytes,
            }))
            .ok();

        {
            let mut files = self.files.write().await;
            files.insert(
                id,
                Entry {
                    file,
                    cancel: cancel.clone(),
                },
            );
            self.publish(&files);
        }

        let orchestrator = self.clone_for_task();
        core_async::task::spawn(async move {
            orchestrator.run_pipeline(id, source, cancel).await;
        });

        info!(file_id = %id, "File selected");
        id
    }

    /// Drop a file, aborting its upload or synchronization.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: LocalFileId) -> Result<PendingFile> {
        let entry = {
            let mut files = self.files.write().await;
            let entry = files.remove(&id).ok_or(UploadError::NotFound(id))?;
            self.publish(&files);
            entry
        };
        entry.cancel.cancel();

        self.event_bus
            .emit(CoreEvent::Upload(UploadEvent::Removed {
                file_id: id.to_string(),
            }))
            .ok();
        info!(file_id = %id, "File removed");
        Ok(entry.file)
    }

    /// Remove a `Ready` file for promotion into a job.
    ///
    /// Returns the server file id and the final metadata, or `None` when
    /// the file is unknown or not ready.
    pub async fn take_ready(&self, id: LocalFileId) -> Option<(String, MediaMetadata)> {
        let mut files = self.files.write().await;
        let entry = files.get(&id)?;
        let FileStatus::Ready { metadata } = &entry.file.status else {
            debug!(file_id = %id, status = entry.file.status.name(), "File not ready");
            return None;
        };
        let server_id = entry.file.server_id.clone()?;
        let metadata = metadata.clone();

        files.remove(&id);
        self.publish(&files);
        Some((server_id, metadata))
    }

    pub async fn get(&self, id: LocalFileId) -> Option<PendingFile> {
        self.files.read().await.get(&id).map(|entry| entry.file.clone())
    }

    /// All files, oldest selection first.
    pub async fn list(&self) -> Vec<PendingFile> {
        snapshot(&*self.files.read().await)
    }

    /// Snapshot stream; a new value is published after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<PendingFile>> {
        self.snapshots.subscribe()
    }

    /// Cancel every running pipeline. Files keep their last state.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn publish(&self, files: &HashMap<LocalFileId, Entry>) {
        self.snapshots.send_replace(snapshot(files));
    }

    /// Apply `transition` if the file still exists.
    ///
    /// Returns the new state, or `None` when the file is gone or the
    /// transition does not apply to its current status.
    async fn update<F>(&self, id: LocalFileId, transition: F) -> Option<PendingFile>
    where
        F: FnOnce(PendingFile) -> Result<PendingFile>,
    {
        let mut files = self.files.write().await;
        let Some(entry) = files.get_mut(&id) else {
            debug!(file_id = %id, "Update for removed file dropped");
            return None;
        };

        match transition(entry.file.clone()) {
            Ok(next) => {
                if next == entry.file {
                    return None;
                }
                entry.file = next.clone();
                self.publish(&files);
                Some(next)
            }
            Err(e) => {
                debug!(file_id = %id, error = %e, "Transition rejected");
                None
            }
        }
    }

    async fn fail(&self, id: LocalFileId, message: String) {
        let message_for_file = message.clone();
        if self
            .update(id, move |file| file.fail(message_for_file))
            .await
            .is_some()
        {
            warn!(file_id = %id, %message, "File failed");
            self.event_bus
                .emit(CoreEvent::Upload(UploadEvent::Failed {
                    file_id: id.to_string(),
                    message,
                }))
                .ok();
        }
    }

    #[instrument(skip(self, source, cancel), fields(file_id = %id))]
    async fn run_pipeline(
        &self,
        id: LocalFileId,
        source: Arc<dyn FileSource>,
        cancel: CancellationToken,
    ) {
        let presigned = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = self.connector.presign(source.name(), source.size()) => result,
        };
        let target = match presigned {
            Ok(target) => target,
            Err(e) => {
                self.fail(id, e.message().to_string()).await;
                return;
            }
        };

        let server_id = target.file_id.clone();
        if self
            .update(id, |file| file.with_server_id(server_id.clone()))
            .await
            .is_none()
        {
            return;
        }

        self.spawn_local_probe(id, Arc::clone(&source), cancel.clone());

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let upload = self.channel.upload(
            &target.upload_url,
            source.as_ref(),
            move |percent| {
                progress_tx.send(percent).ok();
            },
            &cancel,
        );
        let uploaded = self.drive_upload(id, upload, progress_rx).await;

        match uploaded {
            Ok(()) => {}
            Err(UploadError::Aborted) => return,
            Err(e) => {
                self.fail(id, e.to_string()).await;
                return;
            }
        }

        let confirmed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = self.connector.confirm_upload(&server_id) => result,
        };
        if let Err(e) = confirmed {
            self.fail(id, e.message().to_string()).await;
            return;
        }

        if self
            .update(id, |file| file.start_analysis(AnalysisStage::Queued))
            .await
            .is_none()
        {
            return;
        }
        self.emit_analyzing(id, &server_id, &AnalysisStage::Queued, None);
        info!(server_id = %server_id, "Upload confirmed, analysis started");

        let metadata_source = FileMetadataSource::new(self.connector.clone(), server_id.clone());
        let server_ref = server_id.as_str();
        let outcome = self
            .synchronizer
            .run_with(
                &metadata_source,
                move |progress| self.apply_analysis_progress(id, server_ref, progress),
                &cancel,
            )
            .await;

        match outcome {
            Ok(metadata) => {
                if self.update(id, |file| file.ready(metadata)).await.is_some() {
                    info!(server_id = %server_id, "File ready");
                    self.event_bus
                        .emit(CoreEvent::Upload(UploadEvent::Ready {
                            file_id: id.to_string(),
                            server_id,
                        }))
                        .ok();
                }
            }
            Err(SyncError::Cancelled) => {}
            Err(e) => self.fail(id, e.to_string()).await,
        }
    }

    /// Await the upload while applying its progress reports in order.
    async fn drive_upload<W>(
        &self,
        id: LocalFileId,
        upload: W,
        mut progress: mpsc::UnboundedReceiver<u8>,
    ) -> Result<()>
    where
        W: Future<Output = Result<()>>,
    {
        tokio::pin!(upload);
        let result = loop {
            tokio::select! {
                result = &mut upload => break result,
                Some(percent) = progress.recv() => self.apply_upload_progress(id, percent).await,
            }
        };
        while let Ok(percent) = progress.try_recv() {
            self.apply_upload_progress(id, percent).await;
        }
        result
    }

    fn spawn_local_probe(&self, id: LocalFileId, source: Arc<dyn FileSource>, cancel: CancellationToken) {
        let Some(analyzer) = self.analyzer.clone() else {
            return;
        };
        let orchestrator = self.clone_for_task();

        core_async::task::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                outcome = analyzer.analyze(source.as_ref()) => outcome,
            };
            if !outcome.is_complete() {
                debug!(file_id = %id, status = ?outcome.status, "No preliminary metadata");
                return;
            }

            let duration_ms = outcome
                .metadata
                .duration_secs
                .map(|secs| (secs * 1000.0).round() as u64);
            let merged = orchestrator
                .update(id, |file| Ok(file.merge_preliminary(outcome.metadata)))
                .await;
            if merged.is_some() {
                orchestrator
                    .event_bus
                    .emit(CoreEvent::Upload(UploadEvent::PreliminaryMetadata {
                        file_id: id.to_string(),
                        duration_ms,
                    }))
                    .ok();
            }
        });
    }

    async fn apply_upload_progress(&self, id: LocalFileId, percent: u8) {
        if self
            .update(id, |file| file.record_upload_progress(percent))
            .await
            .is_some()
        {
            self.event_bus
                .emit(CoreEvent::Upload(UploadEvent::Progress {
                    file_id: id.to_string(),
                    percent,
                }))
                .ok();
        }
    }

    async fn apply_analysis_progress(&self, id: LocalFileId, server_id: &str, progress: SyncProgress) {
        let stage = progress.stage.as_deref().map(AnalysisStage::from_wire);
        let eta_seconds = progress.eta_seconds;

        let Some(file) = self
            .update(id, |file| file.record_analysis_progress(stage, eta_seconds))
            .await
        else {
            return;
        };
        if let FileStatus::Analyzing { stage, eta_seconds } = &file.status {
            self.emit_analyzing(id, server_id, stage, *eta_seconds);
        }
    }

    fn emit_analyzing(
        &self,
        id: LocalFileId,
        server_id: &str,
        stage: &AnalysisStage,
        eta_seconds: Option<u32>,
    ) {
        self.event_bus
            .emit(CoreEvent::Upload(UploadEvent::Analyzing {
                file_id: id.to_string(),
                server_id: server_id.to_string(),
                stage: stage.to_string(),
                eta_seconds,
            }))
            .ok();
    }
}

fn snapshot(files: &HashMap<LocalFileId, Entry>) -> Vec<PendingFile> {
    let mut list: Vec<PendingFile> = files.values().map(|entry| entry.file.clone()).collect();
    list.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.local_id.cmp(&b.local_id))
    });
    list
}
