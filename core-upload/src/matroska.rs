//! Matroska / WebM probing on top of symphonia's demuxer.
//!
//! Only the leading bytes of the file are available. They are handed to
//! symphonia as an unseekable source, so the demuxer reads `Info` and
//! `Tracks` up to the first `Cluster` and never follows the seek head to
//! cues or tags at the end of the file.
//!
//! Symphonia describes the segment duration and the audio tracks. Video and
//! subtitle details are left to the server analysis.

use std::io::Cursor;
use symphonia::core::codecs::{CodecParameters, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, Track};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::debug;

use crate::metadata::{AudioTrack, MediaMetadata};

/// Leading bytes of every EBML stream.
pub const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("unsupported container: {0}")]
    Unsupported(String),

    #[error("malformed container: {0}")]
    Malformed(String),
}

impl From<SymphoniaError> for ContainerError {
    fn from(err: SymphoniaError) -> Self {
        match err {
            SymphoniaError::Unsupported(reason) => ContainerError::Unsupported(reason.to_string()),
            other => ContainerError::Malformed(other.to_string()),
        }
    }
}

/// Read duration and audio tracks from the head of a Matroska file.
pub fn parse(head: &[u8]) -> Result<MediaMetadata, ContainerError> {
    if !head.starts_with(&EBML_MAGIC) {
        return Err(ContainerError::Unsupported("not an EBML stream".to_string()));
    }

    let source = ReadOnlySource::new(Cursor::new(head.to_vec()));
    let stream = MediaSourceStream::new(Box::new(source), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("mkv");

    let probed = symphonia::default::get_probe().format(
        &hint,
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let tracks = probed.format.tracks();
    debug!(tracks = tracks.len(), "Matroska tracks read");

    let duration_secs = tracks
        .iter()
        .find_map(|track| duration_secs(&track.codec_params));

    // Only audio entries carry a sampling frequency.
    let audio_tracks = tracks
        .iter()
        .filter(|track| track.codec_params.sample_rate.is_some())
        .enumerate()
        .map(|(index, track)| audio_track(index, track))
        .collect();

    Ok(MediaMetadata {
        duration_secs,
        audio_tracks,
        ..MediaMetadata::empty()
    })
}

/// Segment duration in seconds, from the track's frame count and time base.
fn duration_secs(params: &CodecParameters) -> Option<f64> {
    let frames = params.n_frames?;
    let time = params.time_base?.calc_time(frames);
    let secs = time.seconds as f64 + time.frac;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

fn audio_track(index: usize, track: &Track) -> AudioTrack {
    let params = &track.codec_params;
    AudioTrack {
        index: index as u32,
        // Matroska track numbers start at 1, stream indexes at 0.
        ffmpeg_index: track.id.checked_sub(1),
        language: track.language.clone(),
        codec: codec_name(params),
        channels: params.channels.map(|channels| channels.count() as u32),
        // FlagDefault is not exposed; the first track stands in.
        default: index == 0,
    }
}

fn codec_name(params: &CodecParameters) -> Option<String> {
    if params.codec == CODEC_TYPE_NULL {
        return None;
    }
    symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|descriptor| descriptor.short_name.to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Minimal EBML writer for building fixtures.

    /// How element sizes are encoded.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SizeWidth {
        /// One byte where the body allows it, as small files are written.
        Compact,
        /// Always eight bytes (`0x01` marker), as mkvmerge and ffmpeg write
        /// segment and cluster sizes.
        Wide,
    }

    fn id_bytes(id: u32) -> Vec<u8> {
        let bytes = id.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        bytes[skip..].to_vec()
    }

    fn size_bytes(len: usize, width: SizeWidth) -> Vec<u8> {
        match width {
            SizeWidth::Compact if len < 0x7F => vec![0x80 | len as u8],
            _ => {
                let mut out = vec![0x01];
                out.extend_from_slice(&(len as u64).to_be_bytes()[1..]);
                out
            }
        }
    }

    pub struct Writer {
        width: SizeWidth,
    }

    impl Writer {
        pub fn new(width: SizeWidth) -> Self {
            Self { width }
        }

        pub fn element(&self, id: u32, body: &[u8]) -> Vec<u8> {
            let mut out = id_bytes(id);
            out.extend(size_bytes(body.len(), self.width));
            out.extend_from_slice(body);
            out
        }

        pub fn uint(&self, id: u32, value: u64) -> Vec<u8> {
            let bytes = value.to_be_bytes();
            let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
            self.element(id, &bytes[skip..])
        }

        pub fn float(&self, id: u32, value: f64) -> Vec<u8> {
            self.element(id, &value.to_be_bytes())
        }

        pub fn string(&self, id: u32, value: &str) -> Vec<u8> {
            self.element(id, value.as_bytes())
        }

        pub fn master(&self, id: u32, children: &[Vec<u8>]) -> Vec<u8> {
            self.element(id, &children.concat())
        }

        pub fn ebml_header(&self, doc_type: &str) -> Vec<u8> {
            self.master(
                0x1A45_DFA3,
                &[
                    self.uint(0x4286, 1),
                    self.uint(0x42F7, 1),
                    self.uint(0x42F2, 4),
                    self.uint(0x42F3, 8),
                    self.string(0x4282, doc_type),
                    self.uint(0x4287, 4),
                    self.uint(0x4285, 2),
                ],
            )
        }

        pub fn info(&self, duration_ms: f64) -> Vec<u8> {
            self.master(
                0x1549_A966,
                &[
                    self.uint(0x2A_D7B1, 1_000_000),
                    self.float(0x4489, duration_ms),
                    self.string(0x4D80, "libebml"),
                    self.string(0x5741, "mkvmerge"),
                ],
            )
        }

        pub fn video_track(&self, number: u64) -> Vec<u8> {
            self.master(
                0xAE,
                &[
                    self.uint(0xD7, number),
                    self.uint(0x73C5, number),
                    self.uint(0x83, 1),
                    self.string(0x86, "V_MPEG4/ISO/AVC"),
                    self.master(0xE0, &[self.uint(0xB0, 1920), self.uint(0xBA, 1080)]),
                ],
            )
        }

        pub fn audio_track(&self, number: u64, language: &str, channels: u64) -> Vec<u8> {
            self.master(
                0xAE,
                &[
                    self.uint(0xD7, number),
                    self.uint(0x73C5, number),
                    self.uint(0x83, 2),
                    self.string(0x86, "A_AAC"),
                    self.string(0x22_B59C, language),
                    self.master(
                        0xE1,
                        &[self.float(0xB5, 48_000.0), self.uint(0x9F, channels)],
                    ),
                ],
            )
        }

        pub fn subtitle_track(&self, number: u64) -> Vec<u8> {
            self.master(
                0xAE,
                &[
                    self.uint(0xD7, number),
                    self.uint(0x73C5, number),
                    self.uint(0x83, 0x11),
                    self.string(0x86, "S_TEXT/UTF8"),
                    self.string(0x22_B59C, "eng"),
                ],
            )
        }

        /// Header, info and tracks followed by a cluster.
        pub fn file(&self, duration_ms: f64, tracks: &[Vec<u8>]) -> Vec<u8> {
            let tracks = self.master(0x1654_AE6B, tracks);
            let cluster = self.master(0x1F43_B675, &[vec![0u8; 256]]);
            let segment = self.master(
                0x1853_8067,
                &[self.info(duration_ms), tracks, cluster],
            );
            [self.ebml_header("matroska"), segment].concat()
        }
    }

    /// A one-hour file with video, one stereo French audio track and an
    /// English subtitle track, written with eight-byte sizes.
    pub fn sample_mkv() -> Vec<u8> {
        let w = Writer::new(SizeWidth::Wide);
        w.file(
            3_600_000.0,
            &[w.video_track(1), w.audio_track(2, "fre", 2), w.subtitle_track(3)],
        )
    }
}
