//! The Playback Service: the process-wide supervisor that admits sessions,
//! enforces the playback cap, and multiplexes the shared-memory buffer across
//! them. One `PlaybackService` per process; one `Session` per
//! admitted client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rialto_common::config::RialtoConfig;
use rialto_common::{RialtoError, RialtoResult};
use rialto_player::decryption::DecryptionService;
use rialto_player::pipeline::Pipeline;
use rialto_player::shm::SharedMemoryBuffer;
use rialto_player::{Session as PlayerSession, DEFAULT_UNDERFLOW_MARGIN};

pub type SessionId = u32;

/// What a caller supplies to `create_session` about the video it intends to
/// play; the exact fields video requirements carry are media-framework
/// plumbing, so this stays a thin holder rather than growing its own
/// validation logic.
#[derive(Debug, Clone, Default)]
pub struct VideoRequirements {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

/// A factory so the supervisor never constructs a concrete `Pipeline`/
/// `PlayerClient`/`DecryptionService` itself — those are framework and
/// transport concerns the core only consumes through traits.
pub trait SessionFactory: Send + Sync {
    fn build_pipeline(&self, session_id: SessionId, requirements: &VideoRequirements) -> Option<Arc<dyn Pipeline>>;
    fn build_client(&self, session_id: SessionId) -> Arc<dyn rialto_player::client::PlayerClient>;
    fn build_decryption_service(&self) -> Arc<dyn DecryptionService>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Inactive,
    Active,
}

struct Registry {
    sessions: HashMap<SessionId, PlayerSession>,
}

pub struct PlaybackService {
    state: AtomicBool,
    config: RialtoConfig,
    factory: Arc<dyn SessionFactory>,
    shm: Arc<SharedMemoryBuffer>,
    registry: Mutex<Registry>,
}

impl PlaybackService {
    pub fn new(config: RialtoConfig, factory: Arc<dyn SessionFactory>) -> RialtoResult<Self> {
        let shm = SharedMemoryBuffer::new(config.shm_size_bytes, config.max_playbacks)?;
        Ok(Self {
            state: AtomicBool::new(false),
            config,
            factory,
            shm: Arc::new(shm),
            registry: Mutex::new(Registry { sessions: HashMap::new() }),
        })
    }

    pub fn state(&self) -> ServiceState {
        if self.state.load(Ordering::SeqCst) {
            ServiceState::Active
        } else {
            ServiceState::Inactive
        }
    }

    pub fn switch_to_active(&self) {
        self.state.store(true, Ordering::SeqCst);
    }

    /// Destroys every session via a cascade of Stop+Shutdown tasks.
    pub fn switch_to_inactive(&self) {
        self.state.store(false, Ordering::SeqCst);
        let mut registry = self.registry.lock();
        for (_, mut session) in registry.sessions.drain() {
            session.shutdown();
        }
    }

    pub fn shared_memory_fd(&self) -> i32 {
        self.shm.get_fd()
    }

    pub fn shared_memory_size(&self) -> usize {
        self.shm.get_size()
    }

    pub fn shared_memory(&self) -> Arc<SharedMemoryBuffer> {
        self.shm.clone()
    }

    /// Rejects a duplicate id, rejects if not Active, rejects if at the
    /// `max_playbacks` cap, rejects if the factory returns no pipeline.
    pub fn create_session(&self, session_id: SessionId, requirements: VideoRequirements) -> RialtoResult<()> {
        if self.state() != ServiceState::Active {
            return Err(RialtoError::ClientProtocol("playback service is not active".into()));
        }

        let mut registry = self.registry.lock();
        if registry.sessions.contains_key(&session_id) {
            return Err(RialtoError::ClientProtocol(format!("session {session_id} already exists")));
        }
        if registry.sessions.len() >= self.config.max_playbacks {
            return Err(RialtoError::ResourceExhaustion("max_playbacks reached".into()));
        }

        let pipeline = self
            .factory
            .build_pipeline(session_id, &requirements)
            .ok_or_else(|| RialtoError::Setup("pipeline factory returned no pipeline".into()))?;
        let client = self.factory.build_client(session_id);
        let decryption_service = self.factory.build_decryption_service();

        let underflow_margin = Duration::from_millis(self.config.underflow_margin_ms);
        let session = PlayerSession::spawn(
            u64::from(session_id),
            pipeline,
            client,
            decryption_service,
            underflow_margin,
        );
        registry.sessions.insert(session_id, session);
        Ok(())
    }

    pub fn destroy_session(&self, session_id: SessionId) -> RialtoResult<()> {
        let mut registry = self.registry.lock();
        let mut session = registry
            .sessions
            .remove(&session_id)
            .ok_or_else(|| RialtoError::ClientProtocol(format!("no such session {session_id}")))?;
        session.shutdown();
        Ok(())
    }

    pub fn with_session<R>(&self, session_id: SessionId, f: impl FnOnce(&PlayerSession) -> R) -> RialtoResult<R> {
        let registry = self.registry.lock();
        let session = registry
            .sessions
            .get(&session_id)
            .ok_or_else(|| RialtoError::ClientProtocol(format!("no such session {session_id}")))?;
        Ok(f(session))
    }

    pub fn session_count(&self) -> usize {
        self.registry.lock().sessions.len()
    }

    /// Fans a heartbeat out to every session; the caller is considered
    /// healthy iff every session's Ping task runs within the heartbeat
    /// timeout. Blocks the caller's thread up to that timeout.
    pub fn ping(&self) -> bool {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let ids: Vec<_> = {
            let registry = self.registry.lock();
            registry.sessions.keys().copied().collect()
        };
        let expected = ids.len();
        if expected == 0 {
            return true;
        }

        let registry = self.registry.lock();
        for id in &ids {
            if let Some(session) = registry.sessions.get(id) {
                let tx = tx.clone();
                session.player.ping(move || {
                    let _ = tx.send(());
                });
            }
        }
        drop(registry);
        drop(tx);

        let timeout = Duration::from_millis(self.config.heartbeat_timeout_ms);
        let mut received = 0;
        while received < expected {
            match rx.recv_timeout(timeout) {
                Ok(()) => received += 1,
                Err(_) => return false,
            }
        }
        true
    }

    /// Sets the westeros/wayland display env vars at boot; plumbing, not
    /// core supervisor logic.
    pub fn export_wayland_env(&self) {
        // SAFETY: called once from `main` before any other thread is spawned.
        unsafe {
            std::env::set_var("WAYLAND_DISPLAY", &self.config.wayland_env.wayland_display);
            std::env::set_var(
                "RIALTO_SUBTITLE_WAYLAND_DISPLAY",
                &self.config.wayland_env.wayland_display_subtitles,
            );
        }
    }
}

/// Used when no media-framework backend is compiled in; `build_pipeline`
/// always returns `None`, so every `create_session` call fails with `Setup`
/// rather than the binary silently doing nothing useful.
#[cfg(not(feature = "gst"))]
pub struct NullSessionFactory;

#[cfg(not(feature = "gst"))]
struct UnreachableClient;

#[cfg(not(feature = "gst"))]
impl rialto_player::client::PlayerClient for UnreachableClient {
    fn notify_playback_state(&self, _state: rialto_player::client::PlaybackState) {}
    fn notify_need_media_data(&self, _source: rialto_common::media::SourceType) -> bool {
        false
    }
    fn notify_position(&self, _position_ns: u64) {}
    fn notify_network_state(&self, _state: rialto_player::client::NetworkState) {}
    fn notify_buffer_underflow(&self, _source: rialto_common::media::SourceType) {}
    fn notify_source_flushed(&self, _source: rialto_common::media::SourceType) {}
    fn invalidate_active_requests(&self, _source: rialto_common::media::SourceType) {}
    fn clear_active_requests_cache(&self) {}
    fn notify_qos(&self, _source: rialto_common::media::SourceType, _qos: rialto_player::client::QosInfo) {}
}

#[cfg(not(feature = "gst"))]
struct UnreachableDecryptionService;

#[cfg(not(feature = "gst"))]
impl DecryptionService for UnreachableDecryptionService {
    fn decrypt(&self, data: &[u8], _descriptor: &rialto_common::media::EncryptionDescriptor) -> RialtoResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}

#[cfg(not(feature = "gst"))]
impl SessionFactory for NullSessionFactory {
    fn build_pipeline(&self, _session_id: SessionId, _requirements: &VideoRequirements) -> Option<Arc<dyn Pipeline>> {
        None
    }

    fn build_client(&self, _session_id: SessionId) -> Arc<dyn rialto_player::client::PlayerClient> {
        Arc::new(UnreachableClient)
    }

    fn build_decryption_service(&self) -> Arc<dyn DecryptionService> {
        Arc::new(UnreachableDecryptionService)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use rialto_player::client::fake::FakeClient;
    use rialto_player::client::PlayerClient;
    use rialto_player::decryption::fake::NoopDecryptionService;
    use rialto_player::pipeline::fake::FakePipeline;

    struct FakeFactory;

    impl SessionFactory for FakeFactory {
        fn build_pipeline(&self, _session_id: SessionId, _requirements: &VideoRequirements) -> Option<Arc<dyn Pipeline>> {
            Some(Arc::new(FakePipeline::new()))
        }

        fn build_client(&self, _session_id: SessionId) -> Arc<dyn PlayerClient> {
            Arc::new(FakeClient::new())
        }

        fn build_decryption_service(&self) -> Arc<dyn DecryptionService> {
            Arc::new(NoopDecryptionService)
        }
    }

    fn service_with_cap(max_playbacks: usize) -> PlaybackService {
        let mut config = RialtoConfig::default();
        config.max_playbacks = max_playbacks;
        config.shm_size_bytes = 1024 * 1024;
        PlaybackService::new(config, Arc::new(FakeFactory)).expect("construct service")
    }

    #[test]
    fn rejects_sessions_while_inactive() {
        let service = service_with_cap(2);
        let err = service.create_session(1, VideoRequirements::default()).unwrap_err();
        assert!(matches!(err, RialtoError::ClientProtocol(_)));
    }

    #[test]
    fn enforces_max_playbacks_and_rejects_duplicate_ids() {
        let service = service_with_cap(2);
        service.switch_to_active();

        service.create_session(1, VideoRequirements::default()).unwrap();
        service.create_session(2, VideoRequirements::default()).unwrap();

        assert!(matches!(
            service.create_session(1, VideoRequirements::default()).unwrap_err(),
            RialtoError::ClientProtocol(_)
        ));
        assert!(matches!(
            service.create_session(3, VideoRequirements::default()).unwrap_err(),
            RialtoError::ResourceExhaustion(_)
        ));
        assert_eq!(service.session_count(), 2);
    }

    #[test]
    fn switch_to_inactive_tears_down_every_session() {
        let service = service_with_cap(2);
        service.switch_to_active();
        service.create_session(1, VideoRequirements::default()).unwrap();

        service.switch_to_inactive();
        assert_eq!(service.session_count(), 0);
        assert_eq!(service.state(), ServiceState::Inactive);
    }
}
