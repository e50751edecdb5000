//! Error taxonomy for the Rialto core, grouped by failure kind rather than by
//! call site. Nothing here crosses the worker boundary: tasks report failure to
//! the client through the callback set, never by returning this type out of
//! `execute()`. `RialtoError` is used at the few seams that do return a
//! `Result`: session/task construction, the `Pipeline`/`DecryptionService`
//! trait methods, and `SessionPlayer`'s direct-read queries.

use thiserror::Error;

pub type RialtoResult<T> = Result<T, RialtoError>;

#[derive(Debug, Error)]
pub enum RialtoError {
    /// State change or seek failed at the framework level. Surfaces to the
    /// client as `PlaybackState::Failure`; the session is not torn down.
    #[error("transient framework error: {0}")]
    Transient(String),

    /// Malformed or out-of-protocol client request (`haveData` for an unknown
    /// request id, `setSourcePosition` for a source that was never attached).
    /// Returned to the offending RPC only; no context side effects.
    #[error("client protocol error: {0}")]
    ClientProtocol(String),

    /// A shared-memory partition had no room for a requested write.
    /// Not an error state: the client retains the segment and retries.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    /// Element/pipeline construction failed; the session is never registered.
    #[error("setup failed: {0}")]
    Setup(String),

    /// A `GstMessageError` (or equivalent) arrived on the framework bus. The
    /// worker is drained by a Stop+Shutdown pair scheduled by the bus handler.
    #[error("fatal framework error: {0}")]
    Fatal(String),
}

impl RialtoError {
    /// Whether this error should additionally tear the session down.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
