//! The process-wide shared-memory buffer: a single memfd sliced
//! into fixed-size per-`(session, source)` partitions. The memfd/mmap
//! plumbing follows the idiom used elsewhere in this crate:
//! `parking_lot::Mutex` guarding shared state, `libc` errors mapped
//! straight into `RialtoError`.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;

use parking_lot::Mutex;
use rialto_common::media::SourceType;
use rialto_common::{RialtoError, RialtoResult};

/// One `(sessionId, sourceType)` slice of the memfd.
#[derive(Debug, Clone, Copy)]
struct PartitionMeta {
    offset: usize,
    capacity: usize,
    cursor: usize,
}

struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is backed by a memfd; all access to the pointer goes
// through `SharedMemoryBuffer`'s own `Mutex`, enforcing a single writer per
// partition at any time.
unsafe impl Send for MappedRegion {}

pub struct SharedMemoryBuffer {
    fd: OwnedFd,
    region: MappedRegion,
    per_session_size: usize,
    partitions: Mutex<HashMap<(u32, SourceType), PartitionMeta>>,
}

const SOURCE_KINDS: [SourceType; 3] = [SourceType::Audio, SourceType::Video, SourceType::Subtitle];

impl SharedMemoryBuffer {
    /// Allocate a memfd of `total_size` bytes, evenly sliced across
    /// `max_sessions` sessions. Partition placement is deterministic: session
    /// index * per-session size + per-source offset.
    pub fn new(total_size: usize, max_sessions: usize) -> RialtoResult<Self> {
        let max_sessions = max_sessions.max(1);
        let per_session_size = total_size / max_sessions;

        let name = std::ffi::CString::new("rialto-shm").expect("no interior nul");
        // SAFETY: `name` is a valid NUL-terminated C string; memfd_create has
        // no other preconditions.
        let raw_fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
        if raw_fd < 0 {
            return Err(RialtoError::Setup(format!(
                "memfd_create failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        // SAFETY: `raw_fd` was just returned by `memfd_create` and is owned
        // here; no other code has a handle to it yet.
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        // SAFETY: `fd` is a valid, open file descriptor.
        let truncate_result = unsafe { libc::ftruncate(fd.as_raw_fd(), total_size as libc::off_t) };
        if truncate_result != 0 {
            return Err(RialtoError::Setup(format!(
                "ftruncate failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        // SAFETY: `fd` is sized to at least `total_size` bytes by the
        // `ftruncate` call above; the mapping is dropped (munmap'd) in
        // `Drop` before the fd itself closes.
        let map = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if map == libc::MAP_FAILED {
            return Err(RialtoError::Setup(format!(
                "mmap failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let ptr = NonNull::new(map.cast::<u8>()).expect("mmap returned a non-null pointer on success");

        Ok(Self {
            fd,
            region: MappedRegion { ptr, len: total_size },
            per_session_size,
            partitions: Mutex::new(HashMap::new()),
        })
    }

    pub fn get_fd(&self) -> i32 {
        self.fd.as_raw_fd()
    }

    pub fn get_size(&self) -> usize {
        self.region.len
    }

    fn source_offset(&self, source: SourceType) -> usize {
        let per_source = self.per_session_size / SOURCE_KINDS.len();
        let index = SOURCE_KINDS.iter().position(|s| *s == source).unwrap_or(0);
        index * per_source
    }

    /// Returns `{base ptr, capacity}` for `(session_id, source)`, creating the
    /// partition entry on first use.
    pub fn map_partition(&self, session_index: usize, source: SourceType) -> RialtoResult<(*mut u8, usize)> {
        let base = session_index
            .checked_mul(self.per_session_size)
            .ok_or_else(|| RialtoError::ResourceExhaustion("session index overflow".into()))?;
        let offset = base + self.source_offset(source);
        let capacity = self.per_session_size / SOURCE_KINDS.len();

        if offset + capacity > self.region.len {
            return Err(RialtoError::ResourceExhaustion(
                "partition would exceed shared memory region".into(),
            ));
        }

        let mut partitions = self.partitions.lock();
        partitions
            .entry((session_index as u32, source))
            .or_insert(PartitionMeta { offset, capacity, cursor: 0 });

        // SAFETY: `offset + capacity <= self.region.len`, checked above.
        let ptr = unsafe { self.region.ptr.as_ptr().add(offset) };
        Ok((ptr, capacity))
    }

    pub fn clear_partition(&self, session_index: usize, source: SourceType) {
        if let Some(meta) = self
            .partitions
            .lock()
            .get_mut(&(session_index as u32, source))
        {
            meta.cursor = 0;
        }
    }

    /// Pointer into the mapping for the data reader, spanning the bytes the
    /// client has written so far.
    pub fn get_data_ptr(&self, session_index: usize, source: SourceType) -> RialtoResult<(*const u8, usize)> {
        let partitions = self.partitions.lock();
        let meta = partitions
            .get(&(session_index as u32, source))
            .ok_or_else(|| RialtoError::ClientProtocol("partition not mapped".into()))?;
        // SAFETY: `meta.offset + meta.capacity <= self.region.len` was
        // verified when the partition was created in `map_partition`.
        let ptr = unsafe { self.region.ptr.as_ptr().add(meta.offset) };
        Ok((ptr.cast_const(), meta.capacity))
    }
}

impl Drop for SharedMemoryBuffer {
    fn drop(&mut self) {
        // SAFETY: `self.region.ptr`/`len` are exactly the values returned by
        // the `mmap` call in `new`, and nothing else retains a copy of the
        // pointer past this point.
        unsafe {
            libc::munmap(self.region.ptr.as_ptr().cast(), self.region.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_for_different_sessions_do_not_overlap() {
        let shm = SharedMemoryBuffer::new(1024 * 1024, 4).expect("allocate shm");
        let (p0, cap0) = shm.map_partition(0, SourceType::Audio).unwrap();
        let (p1, _cap1) = shm.map_partition(1, SourceType::Audio).unwrap();
        assert!((p1 as usize) >= (p0 as usize) + cap0);
    }

    #[test]
    fn partitions_for_different_sources_do_not_overlap() {
        let shm = SharedMemoryBuffer::new(1024 * 1024, 4).expect("allocate shm");
        let (audio_ptr, audio_cap) = shm.map_partition(0, SourceType::Audio).unwrap();
        let (video_ptr, _) = shm.map_partition(0, SourceType::Video).unwrap();
        assert!((video_ptr as usize) >= (audio_ptr as usize) + audio_cap);
    }
}
