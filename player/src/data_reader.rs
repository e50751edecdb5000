//! The data reader: parses a client-written partition into
//! `MediaSegment` values. Layout: a packed header (source type tag, segment
//! count) followed by one fixed-size record per segment (timestamp, duration,
//! payload offset/length, an encryption-descriptor flag and its fields when
//! set), followed by the raw segment payloads.

use std::sync::Arc;
use std::time::Duration;

use rialto_common::media::{EncryptionDescriptor, MediaSegment, SegmentExtra, SourceType};
use rialto_common::{RialtoError, RialtoResult};

use crate::shm::SharedMemoryBuffer;

/// Implemented by `Task::ReadShmDataAndAttachSamples` to obtain segments for
/// a session's partition without depending on the supervisor directly.
pub trait PartitionReader: Send + Sync {
    fn read(&self, source: SourceType) -> RialtoResult<Vec<MediaSegment>>;
}

const HEADER_LEN: usize = 8;
const RECORD_LEN: usize = 40;

fn read_u32(buf: &[u8], at: usize) -> RialtoResult<u32> {
    buf.get(at..at + 4)
        .map(|s| u32::from_le_bytes(s.try_into().expect("slice of len 4")))
        .ok_or_else(|| RialtoError::ClientProtocol("truncated partition header".into()))
}

fn read_u64(buf: &[u8], at: usize) -> RialtoResult<u64> {
    buf.get(at..at + 8)
        .map(|s| u64::from_le_bytes(s.try_into().expect("slice of len 8")))
        .ok_or_else(|| RialtoError::ClientProtocol("truncated partition record".into()))
}

/// Reads a session's partition out of the shared `SharedMemoryBuffer`. The
/// returned `MediaSegment`s own a copy of their payload: the zero-copy window
/// into the partition is valid only until the `haveData` call completes, so
/// copying out here is the simplest way to uphold that contract without
/// unsafe borrowing across the task boundary.
pub struct ShmPartitionReader {
    shm: Arc<SharedMemoryBuffer>,
    session_index: usize,
    source_id: u32,
}

impl ShmPartitionReader {
    pub fn new(shm: Arc<SharedMemoryBuffer>, session_index: usize, source_id: u32) -> Self {
        Self { shm, session_index, source_id }
    }
}

impl PartitionReader for ShmPartitionReader {
    fn read(&self, source: SourceType) -> RialtoResult<Vec<MediaSegment>> {
        let (ptr, capacity) = self.shm.get_data_ptr(self.session_index, source)?;
        // SAFETY: `ptr` is valid for `capacity` bytes for the lifetime of
        // `self.shm` (guaranteed by `SharedMemoryBuffer::map_partition`); we
        // only ever read within `capacity`, checked by every slice access
        // below.
        let buf = unsafe { std::slice::from_raw_parts(ptr, capacity) };

        let tag = read_u32(buf, 0)?;
        let expected_tag = match source {
            SourceType::Audio => 0,
            SourceType::Video => 1,
            SourceType::Subtitle => 2,
        };
        if tag != expected_tag {
            return Err(RialtoError::ClientProtocol("partition source-type tag mismatch".into()));
        }
        let count = read_u32(buf, 4)? as usize;

        let mut segments = Vec::with_capacity(count);
        let mut record_at = HEADER_LEN;
        let mut payload_at = HEADER_LEN + count * RECORD_LEN;

        for _ in 0..count {
            let timestamp_ns = read_u64(buf, record_at)?;
            let duration_ns = read_u64(buf, record_at + 8)?;
            let data_len = read_u32(buf, record_at + 16)? as usize;
            let has_encryption = read_u32(buf, record_at + 20)? != 0;
            let key_id_len = read_u32(buf, record_at + 24)? as usize;
            let iv_len = read_u32(buf, record_at + 28)? as usize;
            let clear_bytes = read_u32(buf, record_at + 32)?;
            let encrypted_bytes = read_u32(buf, record_at + 36)?;

            let data = buf
                .get(payload_at..payload_at + data_len)
                .ok_or_else(|| RialtoError::ClientProtocol("segment payload out of bounds".into()))?
                .to_vec();
            payload_at += data_len;

            let encryption = if has_encryption {
                let key_id = buf
                    .get(payload_at..payload_at + key_id_len)
                    .ok_or_else(|| RialtoError::ClientProtocol("key id out of bounds".into()))?
                    .to_vec();
                payload_at += key_id_len;
                let init_vector = buf
                    .get(payload_at..payload_at + iv_len)
                    .ok_or_else(|| RialtoError::ClientProtocol("iv out of bounds".into()))?
                    .to_vec();
                payload_at += iv_len;
                Some(EncryptionDescriptor {
                    media_key_session_id: 0,
                    key_id,
                    init_vector,
                    init_with_last_15: false,
                    sub_samples: vec![rialto_common::media::SubSample {
                        clear_bytes,
                        encrypted_bytes,
                    }],
                })
            } else {
                None
            };

            segments.push(MediaSegment {
                source_id: self.source_id,
                source_type: source,
                timestamp: Duration::from_nanos(timestamp_ns),
                duration: Duration::from_nanos(duration_ns),
                data,
                codec_data: None,
                encryption,
                extra: SegmentExtra::None,
            });

            record_at += RECORD_LEN;
        }

        Ok(segments)
    }
}
