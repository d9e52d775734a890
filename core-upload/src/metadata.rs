//! Media metadata model and merge rules.
//!
//! A pending file can carry metadata from two places: the local probe
//! (preliminary, available within seconds) and the server analysis
//! (authoritative). [`MediaMetadata::overlay`] merges them field by field,
//! with the authoritative side winning wherever it has a value.

use provider_backend::{WireAudioTrack, WireMetadata, WireSubtitleTrack};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// From the local pre-analysis probe.
    Preliminary,
    /// From the server's analysis.
    Authoritative,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Position among audio tracks.
    pub index: u32,
    /// Container-wide stream index.
    pub ffmpeg_index: Option<u32>,
    pub language: Option<String>,
    pub codec: Option<String>,
    pub channels: Option<u32>,
    pub default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// Position among subtitle tracks.
    pub index: u32,
    /// Container-wide stream index.
    pub ffmpeg_index: Option<u32>,
    pub language: Option<String>,
    pub codec: Option<String>,
    pub forced: bool,
    pub default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_secs: Option<f64>,
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub audio_tracks: Vec<AudioTrack>,
    pub subtitle_tracks: Vec<SubtitleTrack>,
}

impl MediaMetadata {
    /// Metadata with every field absent.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.duration_secs.is_none()
            && self.video_codec.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.audio_tracks.is_empty()
            && self.subtitle_tracks.is_empty()
    }

    /// Merge `authoritative` over `self`.
    ///
    /// Scalar fields take the authoritative value when present. Track lists
    /// are replaced wholesale when the authoritative list is non-empty.
    pub fn overlay(&self, authoritative: &MediaMetadata) -> MediaMetadata {
        MediaMetadata {
            duration_secs: authoritative.duration_secs.or(self.duration_secs),
            video_codec: authoritative
                .video_codec
                .clone()
                .or_else(|| self.video_codec.clone()),
            width: authoritative.width.or(self.width),
            height: authoritative.height.or(self.height),
            audio_tracks: if authoritative.audio_tracks.is_empty() {
                self.audio_tracks.clone()
            } else {
                authoritative.audio_tracks.clone()
            },
            subtitle_tracks: if authoritative.subtitle_tracks.is_empty() {
                self.subtitle_tracks.clone()
            } else {
                authoritative.subtitle_tracks.clone()
            },
        }
    }
}

impl From<WireAudioTrack> for AudioTrack {
    fn from(track: WireAudioTrack) -> Self {
        Self {
            index: track.index,
            ffmpeg_index: track.ffmpeg_index,
            language: track.language,
            codec: track.codec,
            channels: track.channels,
            default: track.default,
        }
    }
}

impl From<WireSubtitleTrack> for SubtitleTrack {
    fn from(track: WireSubtitleTrack) -> Self {
        Self {
            index: track.index,
            ffmpeg_index: track.ffmpeg_index,
            language: track.language,
            codec: track.codec,
            forced: track.forced,
            default: track.default,
        }
    }
}

impl From<WireMetadata> for MediaMetadata {
    fn from(wire: WireMetadata) -> Self {
        Self {
            duration_secs: wire.duration.filter(|d| d.is_finite() && *d >= 0.0),
            video_codec: wire.video_codec,
            width: wire.width,
            height: wire.height,
            audio_tracks: wire.audio_tracks.into_iter().map(Into::into).collect(),
            subtitle_tracks: wire.subtitle_tracks.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preliminary() -> MediaMetadata {
        MediaMetadata {
            duration_secs: Some(3598.2),
            video_codec: Some("h264".to_string()),
            width: Some(1920),
            height: Some(1080),
            audio_tracks: vec![AudioTrack {
                index: 0,
                language: Some("eng".to_string()),
                ..Default::default()
            }],
            subtitle_tracks: vec![],
        }
    }

    #[test]
    fn test_empty_metadata() {
        assert!(MediaMetadata::empty().is_empty());
        assert!(!preliminary().is_empty());
    }

    #[test]
    fn test_authoritative_fields_win() {
        let authoritative = MediaMetadata {
            duration_secs: Some(3600.0),
            video_codec: Some("hevc".to_string()),
            ..Default::default()
        };

        let merged = preliminary().overlay(&authoritative);

        assert_eq!(merged.duration_secs, Some(3600.0));
        assert_eq!(merged.video_codec.as_deref(), Some("hevc"));
        // absent on the authoritative side: preliminary survives
        assert_eq!(merged.width, Some(1920));
        assert_eq!(merged.audio_tracks.len(), 1);
    }

    #[test]
    fn test_track_lists_replace_wholesale() {
        let authoritative = MediaMetadata {
            audio_tracks: vec![
                AudioTrack {
                    index: 0,
                    codec: Some("aac".to_string()),
                    ..Default::default()
                },
                AudioTrack {
                    index: 1,
                    codec: Some("ac3".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let merged = preliminary().overlay(&authoritative);

        assert_eq!(merged.audio_tracks, authoritative.audio_tracks);
    }

    #[test]
    fn test_from_wire_drops_invalid_duration() {
        let wire = WireMetadata {
            duration: Some(f64::NAN),
            video_codec: Some("h264".to_string()),
            ..Default::default()
        };

        let metadata = MediaMetadata::from(wire);

        assert_eq!(metadata.duration_secs, None);
        assert_eq!(metadata.video_codec.as_deref(), Some("h264"));
    }
}
