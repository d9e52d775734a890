//! Server analysis of one uploaded file, as seen by the synchronizer.

use async_trait::async_trait;
use bridge_traits::PushFrame;
use core_sync::{eta_from_wire, percent_from_wire, PollFailure, SyncProgress, SyncSource, SyncUpdate};
use provider_backend::{ApiError, BackendConnector, MetadataPoll, WireMetadata};
use serde_json::Value;

use crate::metadata::MediaMetadata;

/// Longest ETA shown to users.
pub const MAX_ETA_SECONDS: u32 = 86_400;

/// `pending-file/{file_id}` topic plus `GET /api/upload/{file_id}/metadata/`.
pub struct FileMetadataSource {
    connector: BackendConnector,
    file_id: String,
}

impl FileMetadataSource {
    pub fn new(connector: BackendConnector, file_id: impl Into<String>) -> Self {
        Self {
            connector,
            file_id: file_id.into(),
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }
}

fn terminal_status(status: &str, message: Option<String>) -> Option<SyncUpdate<MediaMetadata>> {
    match status {
        "error" => Some(SyncUpdate::Failed(
            message.unwrap_or_else(|| "Analysis failed".to_string()),
        )),
        "expired" => Some(SyncUpdate::Failed(
            message.unwrap_or_else(|| "Upload expired".to_string()),
        )),
        _ => None,
    }
}

fn non_blank(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SyncSource for FileMetadataSource {
    type Output = MediaMetadata;

    fn topic(&self) -> String {
        format!("pending-file/{}", self.file_id)
    }

    async fn poll(&self) -> Result<SyncUpdate<MediaMetadata>, PollFailure> {
        match self.connector.poll_metadata(&self.file_id).await {
            Ok(MetadataPoll::Ready { metadata, .. }) => Ok(SyncUpdate::Ready(metadata.into())),
            Ok(MetadataPoll::Pending {
                status,
                message,
                stage,
                eta_seconds,
                progress,
            }) => {
                if let Some(terminal) = terminal_status(&status, message.clone()) {
                    return Ok(terminal);
                }
                Ok(SyncUpdate::Progress(SyncProgress {
                    status: Some(status),
                    stage,
                    message,
                    progress: progress.map(percent_from_wire),
                    eta_seconds: eta_seconds.map(|eta| eta_from_wire(eta, MAX_ETA_SECONDS)),
                    speed_factor: None,
                }))
            }
            Err(ApiError::Rejected { message, .. }) => Err(PollFailure::Terminal(message)),
            Err(e) => Err(PollFailure::Transient(e.message().to_string())),
        }
    }

    fn decode(&self, frame: &PushFrame) -> Option<SyncUpdate<MediaMetadata>> {
        match frame.get("type")?.as_str()? {
            "status" | "progress" => {}
            _ => return None,
        }

        let status = non_blank(&frame["status"]);
        let message = non_blank(&frame["message"]);

        match status.as_deref() {
            Some("ready") => {
                if let Some(metadata) = frame
                    .get("metadata")
                    .filter(|m| m.is_object())
                    .and_then(|m| serde_json::from_value::<WireMetadata>(m.clone()).ok())
                {
                    return Some(SyncUpdate::Ready(metadata.into()));
                }
            }
            Some(other) => {
                if let Some(terminal) = terminal_status(other, message.clone()) {
                    return Some(terminal);
                }
            }
            None => {}
        }

        Some(SyncUpdate::Progress(SyncProgress {
            status,
            stage: non_blank(&frame["stage"]),
            message,
            progress: frame["progress"].as_f64().map(percent_from_wire),
            eta_seconds: frame["eta_seconds"]
                .as_f64()
                .map(|eta| eta_from_wire(eta, MAX_ETA_SECONDS)),
            speed_factor: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{HttpClient, HttpRequest, HttpResponse, UploadRequest};
    use serde_json::json;
    use std::sync::Arc;

    struct FixedResponse(u16, Value);

    #[async_trait]
    impl HttpClient for FixedResponse {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse::new(self.0, self.1.to_string()))
        }

        async fn upload_stream(&self, _request: UploadRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse::new(200, ""))
        }
    }

    fn source(status: u16, body: Value) -> FileMetadataSource {
        let connector = BackendConnector::new(Arc::new(FixedResponse(status, body)), "https://api");
        FileMetadataSource::new(connector, "f-1")
    }

    #[test]
    fn test_topic() {
        assert_eq!(source(200, json!({})).topic(), "pending-file/f-1");
    }

    #[core_async::test]
    async fn test_poll_analyzing_is_progress() {
        let source = source(
            202,
            json!({"status": "analyzing", "stage": "probing", "eta_seconds": 12.0, "message": "Analyzing"}),
        );

        let update = source.poll().await.unwrap();

        let SyncUpdate::Progress(progress) = update else {
            panic!("expected progress");
        };
        assert_eq!(progress.stage.as_deref(), Some("probing"));
        assert_eq!(progress.eta_seconds, Some(12));
    }

    #[core_async::test]
    async fn test_poll_ready_carries_metadata() {
        let source = source(
            200,
            json!({"status": "ready", "metadata": {"duration": 3600.0, "video_codec": "h264"}}),
        );

        let update = source.poll().await.unwrap();

        let SyncUpdate::Ready(metadata) = update else {
            panic!("expected ready");
        };
        assert_eq!(metadata.duration_secs, Some(3600.0));
        assert_eq!(metadata.video_codec.as_deref(), Some("h264"));
    }

    #[core_async::test]
    async fn test_poll_rejection_is_terminal() {
        let source = source(
            400,
            json!({"status": "error", "code": "analysis_failed", "message": "ffprobe failed"}),
        );

        let failure = source.poll().await.unwrap_err();

        assert_eq!(failure, PollFailure::Terminal("ffprobe failed".to_string()));
    }

    #[core_async::test]
    async fn test_poll_server_error_is_transient() {
        let source = source(503, json!({}));

        let failure = source.poll().await.unwrap_err();

        assert_eq!(failure, PollFailure::Transient("HTTP 503".to_string()));
    }

    #[test]
    fn test_decode_progress_frame() {
        let update = source(200, json!({})).decode(&json!({
            "type": "progress",
            "progress": 45,
            "status": "analyzing",
            "stage": "DOWNLOADING",
            "message": "Downloading file from storage",
            "eta_seconds": 30
        }));

        assert_eq!(
            update,
            Some(SyncUpdate::Progress(SyncProgress {
                status: Some("analyzing".to_string()),
                stage: Some("DOWNLOADING".to_string()),
                message: Some("Downloading file from storage".to_string()),
                progress: Some(45),
                eta_seconds: Some(30),
                speed_factor: None,
            }))
        );
    }

    #[test]
    fn test_decode_ready_status_frame() {
        let update = source(200, json!({})).decode(&json!({
            "type": "status",
            "status": "ready",
            "progress": 100,
            "metadata": {"duration": 90.5, "audio_tracks": [{"index": 0, "codec": "aac"}]}
        }));

        let Some(SyncUpdate::Ready(metadata)) = update else {
            panic!("expected ready");
        };
        assert_eq!(metadata.duration_secs, Some(90.5));
        assert_eq!(metadata.audio_tracks[0].codec.as_deref(), Some("aac"));
    }

    #[test]
    fn test_decode_ready_without_metadata_is_progress() {
        let update = source(200, json!({})).decode(&json!({
            "type": "progress",
            "status": "ready",
            "progress": 100
        }));

        assert!(matches!(update, Some(SyncUpdate::Progress(_))));
    }

    #[test]
    fn test_decode_error_and_expired() {
        let source = source(200, json!({}));
        assert_eq!(
            source.decode(&json!({"type": "status", "status": "expired"})),
            Some(SyncUpdate::Failed("Upload expired".to_string()))
        );
        assert_eq!(
            source.decode(&json!({"type": "progress", "status": "error", "message": "Corrupt file"})),
            Some(SyncUpdate::Failed("Corrupt file".to_string()))
        );
    }

    #[test]
    fn test_decode_ignores_protocol_errors() {
        let source = source(200, json!({}));
        assert_eq!(source.decode(&json!({"type": "error", "message": "Invalid JSON"})), None);
        assert_eq!(source.decode(&json!({"status": "ready"})), None);
    }
}
