//! # Upload Channel
//!
//! Streams a file to a presigned storage URL and reports integer percent
//! progress as chunks are handed to the transport.
//!
//! Progress is `floor(sent * 100 / total)`, reported only when it grows, so
//! callers see a non-decreasing sequence within `0..=100`. A zero-byte file
//! reports 100 once storage accepts it.

use bridge_traits::{ByteStream, FileSource, HttpClient, UploadRequest};
use core_async::sync::CancellationToken;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::{Result, UploadError};

pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Clone)]
struct ProgressMeter {
    total: u64,
    sent: Arc<AtomicU64>,
    reported: Arc<AtomicU8>,
    on_progress: ProgressCallback,
}

impl ProgressMeter {
    fn new(total: u64, on_progress: ProgressCallback) -> Self {
        Self {
            total,
            sent: Arc::new(AtomicU64::new(0)),
            reported: Arc::new(AtomicU8::new(0)),
            on_progress,
        }
    }

    fn advance(&self, bytes: usize) {
        let sent = self.sent.fetch_add(bytes as u64, Ordering::SeqCst) + bytes as u64;
        if self.total == 0 {
            return;
        }
        let percent = (sent.min(self.total) * 100 / self.total) as u8;
        self.report(percent);
    }

    fn finish(&self) {
        self.report(100);
    }

    fn report(&self, percent: u8) {
        let previous = self.reported.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            (self.on_progress)(percent);
        }
    }
}

#[derive(Clone)]
pub struct UploadChannel {
    http_client: Arc<dyn HttpClient>,
    chunk_size: usize,
}

impl std::fmt::Debug for UploadChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadChannel")
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl UploadChannel {
    pub fn new(http_client: Arc<dyn HttpClient>, chunk_size: usize) -> Self {
        Self {
            http_client,
            chunk_size,
        }
    }

    /// `PUT` the file to `upload_url`.
    ///
    /// # Errors
    ///
    /// - `UploadError::Source` if the file cannot be opened
    /// - `UploadError::Rejected` on a non-2xx response
    /// - `UploadError::Transport` on connection failures
    /// - `UploadError::Aborted` when `abort` fires first
    #[instrument(skip_all, fields(file = %source.name(), size = source.size()))]
    pub async fn upload<F>(
        &self,
        upload_url: &str,
        source: &dyn FileSource,
        on_progress: F,
        abort: &CancellationToken,
    ) -> Result<()>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let total = source.size();
        let meter = ProgressMeter::new(total, Arc::new(on_progress));

        let stream = source
            .open_stream(self.chunk_size)
            .await
            .map_err(|e| UploadError::Source(e.to_string()))?;

        let counting = meter.clone();
        let body: ByteStream = Box::pin(stream.map(move |chunk| {
            if let Ok(bytes) = &chunk {
                counting.advance(bytes.len());
            }
            chunk
        }));

        let mut request = UploadRequest::new(upload_url, total, body);
        if let Some(content_type) = source.content_type() {
            request = request.content_type(content_type);
        }

        let response = tokio::select! {
            biased;
            _ = abort.cancelled() => {
                debug!("Upload aborted");
                return Err(UploadError::Aborted);
            }
            response = self.http_client.upload_stream(request) => response,
        };

        let response = response.map_err(|e| {
            warn!(error = %e, "Upload transport failed");
            UploadError::Transport(e.to_string())
        })?;

        if !response.is_success() {
            warn!(status = response.status, "Storage rejected upload");
            return Err(UploadError::Rejected {
                status: response.status,
            });
        }

        meter.finish();
        debug!("Upload complete");
        Ok(())
    }
}
