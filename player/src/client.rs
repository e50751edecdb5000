//! Client callback set. The core only ever calls through this trait — it
//! never knows whether the other end is a real connected client, an
//! in-process test double, or anything else.

use rialto_common::media::SourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Stopped,
    Seeking,
    SeekDone,
    EndOfStream,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Idle,
    Buffering,
    Stalled,
    DecodeError,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QosInfo {
    pub processed: u64,
    pub dropped: u64,
}

/// Implemented by whatever sits between the worker and the remote client.
/// Every method is fire-and-forget from the worker's point of view except
/// `notify_need_media_data`, whose return indicates whether the client
/// accepted the request.
pub trait PlayerClient: Send + Sync {
    fn notify_playback_state(&self, state: PlaybackState);
    fn notify_need_media_data(&self, source: SourceType) -> bool;
    fn notify_position(&self, position_ns: u64);
    fn notify_network_state(&self, state: NetworkState);
    /// Current path: per-source underflow notification.
    fn notify_buffer_underflow(&self, source: SourceType);
    fn notify_source_flushed(&self, source: SourceType);
    fn invalidate_active_requests(&self, source: SourceType);
    fn clear_active_requests_cache(&self);
    fn notify_qos(&self, source: SourceType, qos: QosInfo);
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::{NetworkState, PlaybackState, PlayerClient, QosInfo};
    use parking_lot::Mutex;
    use rialto_common::media::SourceType;

    #[derive(Debug, Clone, PartialEq)]
    pub enum ClientEvent {
        PlaybackState(PlaybackState),
        NeedMediaData(SourceType),
        Position(u64),
        NetworkState(NetworkState),
        BufferUnderflow(SourceType),
        SourceFlushed(SourceType),
        InvalidateActiveRequests(SourceType),
        ClearActiveRequestsCache,
        Qos(SourceType, QosInfo),
    }

    /// Records every call for assertion in tests. `need_data_accepts` controls
    /// the return value of `notify_need_media_data`, letting a test simulate a
    /// client that stops responding (Scenario D).
    #[derive(Default)]
    pub struct FakeClient {
        pub events: Mutex<Vec<ClientEvent>>,
        pub need_data_accepts: std::sync::atomic::AtomicBool,
    }

    impl FakeClient {
        pub fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                need_data_accepts: std::sync::atomic::AtomicBool::new(true),
            }
        }

        pub fn events(&self) -> Vec<ClientEvent> {
            self.events.lock().clone()
        }
    }

    impl PlayerClient for FakeClient {
        fn notify_playback_state(&self, state: PlaybackState) {
            self.events.lock().push(ClientEvent::PlaybackState(state));
        }

        fn notify_need_media_data(&self, source: SourceType) -> bool {
            self.events.lock().push(ClientEvent::NeedMediaData(source));
            self.need_data_accepts
                .load(std::sync::atomic::Ordering::SeqCst)
        }

        fn notify_position(&self, position_ns: u64) {
            self.events.lock().push(ClientEvent::Position(position_ns));
        }

        fn notify_network_state(&self, state: NetworkState) {
            self.events.lock().push(ClientEvent::NetworkState(state));
        }

        fn notify_buffer_underflow(&self, source: SourceType) {
            self.events.lock().push(ClientEvent::BufferUnderflow(source));
        }

        fn notify_source_flushed(&self, source: SourceType) {
            self.events.lock().push(ClientEvent::SourceFlushed(source));
        }

        fn invalidate_active_requests(&self, source: SourceType) {
            self.events
                .lock()
                .push(ClientEvent::InvalidateActiveRequests(source));
        }

        fn clear_active_requests_cache(&self) {
            self.events.lock().push(ClientEvent::ClearActiveRequestsCache);
        }

        fn notify_qos(&self, source: SourceType, qos: QosInfo) {
            self.events.lock().push(ClientEvent::Qos(source, qos));
        }
    }
}
