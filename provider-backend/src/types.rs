//! Backend API request and response types
//!
//! Wire shapes of the mkv2cast REST API. Fields the server may omit or send
//! blank are `#[serde(default)]` so partial payloads still decode.

use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Uploads
// ============================================================================

/// `POST /api/upload/presigned/` body.
#[derive(Debug, Clone, Serialize)]
pub struct PresignRequest<'a> {
    pub filename: &'a str,
    pub size: u64,
}

/// Presigned upload target issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PresignResponse {
    /// Server-side pending file id.
    pub file_id: String,
    /// Pre-authorized `PUT` URL.
    pub upload_url: String,
    /// Object storage key.
    #[serde(default)]
    pub key: Option<String>,
    /// URL lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// `POST /api/upload/{id}/complete/` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfirmResponse {
    pub status: String,
    #[serde(default)]
    pub file_id: Option<String>,
}

/// Raw body of `GET /api/upload/{id}/metadata/`, any status code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub stage: Option<String>,
    #[serde(default)]
    pub eta_seconds: Option<f64>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub metadata: Option<WireMetadata>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Classified metadata poll result.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataPoll {
    /// 202: the server is still receiving or analyzing the file.
    Pending {
        status: String,
        message: Option<String>,
        stage: Option<String>,
        eta_seconds: Option<f64>,
        progress: Option<f64>,
    },
    /// 200 with `status: "ready"`.
    Ready {
        metadata: WireMetadata,
        filename: Option<String>,
        file_size: Option<u64>,
    },
}

/// Stream layout produced by the server-side ffprobe pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireMetadata {
    #[serde(default)]
    pub audio_tracks: Vec<WireAudioTrack>,
    #[serde(default)]
    pub subtitle_tracks: Vec<WireSubtitleTrack>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub video_codec: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAudioTrack {
    pub index: u32,
    #[serde(default)]
    pub ffmpeg_index: Option<u32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub codec: Option<String>,
    #[serde(default)]
    pub channels: Option<u32>,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSubtitleTrack {
    pub index: u32,
    #[serde(default)]
    pub ffmpeg_index: Option<u32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub codec: Option<String>,
    #[serde(default)]
    pub forced: bool,
    #[serde(default)]
    pub default: bool,
}

// ============================================================================
// Jobs
// ============================================================================

/// User-selectable conversion options. Unset fields use server defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hw_backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vaapi_qp: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qsv_quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_h264: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_hevc: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_aac: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_surround: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_check: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_check: Option<bool>,
}

impl JobOptions {
    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn crf(mut self, crf: u8) -> Self {
        self.crf = Some(crf);
        self
    }

    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }
}

/// `POST /api/jobs/create-from-file/` body.
#[derive(Debug, Clone, Serialize)]
pub struct CreateJobRequest<'a> {
    pub file_id: &'a str,
    pub options: &'a JobOptions,
}

/// Conversion job resource. Only the fields the client reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobResource {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub eta_seconds: Option<f64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
}

/// `GET /api/jobs/active/` is a bare array or a paginated envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum JobList {
    Plain(Vec<JobResource>),
    Paginated { results: Vec<JobResource> },
}

impl JobList {
    pub(crate) fn into_vec(self) -> Vec<JobResource> {
        match self {
            JobList::Plain(jobs) => jobs,
            JobList::Paginated { results } => results,
        }
    }
}

/// `{detail}` body returned by actions and most 4xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailResponse {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl DetailResponse {
    pub fn text(&self) -> Option<&str> {
        self.detail.as_deref().or(self.message.as_deref())
    }
}

// ============================================================================
// Monitoring
// ============================================================================

/// `GET /api/monitoring/` host metrics. Counters are cumulative since boot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringResource {
    #[serde(default)]
    pub available: bool,
    /// Server sample time, unix seconds.
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub cpu: CpuResource,
    #[serde(default)]
    pub memory: MemoryResource,
    #[serde(default)]
    pub disk_io: DiskIoResource,
    #[serde(default)]
    pub network: NetworkResource,
    #[serde(default)]
    pub temperatures: Vec<TemperatureResource>,
    #[serde(default)]
    pub processes: ProcessResource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuResource {
    #[serde(default)]
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryResource {
    #[serde(default)]
    pub used: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskIoResource {
    #[serde(default)]
    pub read_bytes: u64,
    #[serde(default)]
    pub write_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkResource {
    #[serde(default)]
    pub bytes_sent: u64,
    #[serde(default)]
    pub bytes_recv: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureResource {
    pub label: String,
    pub current: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResource {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub running: u32,
}

/// Django sends `""` for empty char fields.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_response_ready_payload() {
        let body = json!({
            "status": "ready",
            "filename": "movie.mkv",
            "file_size": 524288000u64,
            "metadata": {
                "video_codec": "h264",
                "duration": 3600.0,
                "width": 1920,
                "height": 1080,
                "audio_tracks": [
                    {"index": 0, "ffmpeg_index": 1, "language": "eng", "codec": "aac", "channels": 2, "default": true}
                ],
                "subtitle_tracks": [
                    {"index": 0, "ffmpeg_index": 2, "language": "", "codec": "subrip", "forced": false, "default": false}
                ]
            }
        });

        let parsed: MetadataResponse = serde_json::from_value(body).unwrap();
        let metadata = parsed.metadata.unwrap();

        assert_eq!(metadata.video_codec.as_deref(), Some("h264"));
        assert_eq!(metadata.duration, Some(3600.0));
        assert_eq!(metadata.audio_tracks[0].channels, Some(2));
        assert!(metadata.audio_tracks[0].default);
        assert_eq!(metadata.subtitle_tracks[0].language, None);
    }

    #[test]
    fn test_job_resource_blank_fields() {
        let job: JobResource = serde_json::from_value(json!({
            "id": "8b7c3f8e-0d0a-4d51-a8e0-6d1f1f0f6e11",
            "status": "processing",
            "progress": 42,
            "current_stage": "",
            "error_message": ""
        }))
        .unwrap();

        assert_eq!(job.progress, 42.0);
        assert_eq!(job.current_stage, None);
        assert_eq!(job.error_message, None);
        assert_eq!(job.eta_seconds, None);
    }

    #[test]
    fn test_job_list_accepts_both_shapes() {
        let plain: JobList = serde_json::from_value(json!([{"id": "a"}, {"id": "b"}])).unwrap();
        assert_eq!(plain.into_vec().len(), 2);

        let paged: JobList =
            serde_json::from_value(json!({"count": 1, "results": [{"id": "a"}]})).unwrap();
        assert_eq!(paged.into_vec()[0].id, "a");
    }

    #[test]
    fn test_job_options_skip_unset() {
        let options = JobOptions::default().container("mp4").crf(20);
        let value = serde_json::to_value(&options).unwrap();

        assert_eq!(value, json!({"container": "mp4", "crf": 20}));
    }
}
