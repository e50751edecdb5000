//! Value types crossing the RPC boundary: media source descriptors and the
//! segments the data reader hands to the task catalogue.

use std::time::Duration;

/// The media kind a source/segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    Audio,
    Video,
    Subtitle,
}

/// Stream format for video sources (Annex-B byte-stream vs. length-prefixed AVC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Avc,
    ByteStream,
}

/// Whether a video source's samples are aligned to access units or NAL units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentAlignment {
    Au,
    Nal,
}

/// Per-kind payload of a `MediaSource`. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSourceKind {
    Audio {
        sample_rate: u32,
        number_of_channels: u32,
        /// Opaque audio-specific-config bytes (e.g. AAC `AudioSpecificConfig`).
        audio_config: Vec<u8>,
    },
    Video {
        width: u32,
        height: u32,
    },
    VideoDolbyVision {
        width: u32,
        height: u32,
        dolby_vision_profile: u32,
    },
    Subtitle {
        text_track_identifier: String,
    },
}

/// A media source descriptor as delivered by an attach-source request.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSource {
    pub id: u32,
    pub mime_type: String,
    pub segment_alignment: SegmentAlignment,
    pub stream_format: StreamFormat,
    pub codec_data: Option<Vec<u8>>,
    pub has_drm: bool,
    pub kind: MediaSourceKind,
}

impl MediaSource {
    #[must_use]
    pub fn source_type(&self) -> SourceType {
        match self.kind {
            MediaSourceKind::Audio { .. } => SourceType::Audio,
            MediaSourceKind::Video { .. } | MediaSourceKind::VideoDolbyVision { .. } => {
                SourceType::Video
            }
            MediaSourceKind::Subtitle { .. } => SourceType::Subtitle,
        }
    }
}

/// One sub-sample clear/encrypted byte-length pair within an encrypted
/// buffer's sub-sample map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubSample {
    pub clear_bytes: u32,
    pub encrypted_bytes: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionDescriptor {
    pub media_key_session_id: u32,
    pub key_id: Vec<u8>,
    pub init_vector: Vec<u8>,
    pub init_with_last_15: bool,
    pub sub_samples: Vec<SubSample>,
}

/// Per-kind addenda for a segment: audio adds sample rate/channels/clipping,
/// video adds dimensions/frame rate.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentExtra {
    Audio {
        sample_rate: Option<u32>,
        number_of_channels: Option<u32>,
        clipping_start: Duration,
        clipping_end: Duration,
    },
    Video {
        width: Option<u32>,
        height: Option<u32>,
        frame_rate: Option<(u32, u32)>,
    },
    None,
}

/// A decoded segment as produced by the data reader. `data`
/// borrows from the shared-memory partition in the real zero-copy path; owned
/// here because the partition's lifetime is the data reader's lifetime and the
/// reader hands these out already copied out of the mapping for any caller
/// that outlives a single `execute()` (e.g. tests).
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSegment {
    pub source_id: u32,
    pub source_type: SourceType,
    pub timestamp: Duration,
    pub duration: Duration,
    pub data: Vec<u8>,
    pub codec_data: Option<Vec<u8>>,
    pub encryption: Option<EncryptionDescriptor>,
    pub extra: SegmentExtra,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn source_type_follows_kind() {
        let audio = MediaSource {
            id: 1,
            mime_type: "audio/mpeg".into(),
            segment_alignment: SegmentAlignment::Au,
            stream_format: StreamFormat::Avc,
            codec_data: None,
            has_drm: false,
            kind: MediaSourceKind::Audio {
                sample_rate: 48_000,
                number_of_channels: 2,
                audio_config: vec![],
            },
        };
        assert_eq!(audio.source_type(), SourceType::Audio);

        let dv = MediaSource {
            id: 2,
            mime_type: "video/h265".into(),
            segment_alignment: SegmentAlignment::Nal,
            stream_format: StreamFormat::ByteStream,
            codec_data: None,
            has_drm: false,
            kind: MediaSourceKind::VideoDolbyVision {
                width: 1920,
                height: 1080,
                dolby_vision_profile: 5,
            },
        };
        assert_eq!(dv.source_type(), SourceType::Video);
    }
}
