//! Wires real sessions together when the `gst` feature is enabled: a
//! GStreamer-backed `Pipeline`, and the client/decryption seams the
//! transport layer would otherwise fill in. The RPC transport itself is out
//! of scope for this repository (see `connection.rs`), so `LoggingPlayerClient`
//! stands in for it the same way `LoggingConnectionHandler` stands in for a
//! real wire codec.

use std::sync::Arc;

use rialto_common::media::{EncryptionDescriptor, SourceType};
use rialto_common::RialtoResult;
use rialto_player::client::{NetworkState, PlaybackState, PlayerClient, QosInfo};
use rialto_player::decryption::DecryptionService;
use rialto_player::gst_pipeline::GstPipeline;
use rialto_player::pipeline::Pipeline;

use crate::supervisor::{SessionFactory, SessionId, VideoRequirements};

pub struct GstSessionFactory;

impl GstSessionFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GstSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionFactory for GstSessionFactory {
    fn build_pipeline(&self, session_id: SessionId, _requirements: &VideoRequirements) -> Option<Arc<dyn Pipeline>> {
        match GstPipeline::new() {
            Ok(pipeline) => Some(Arc::new(pipeline)),
            Err(err) => {
                error!("session {session_id}: failed to build gst pipeline: {err}");
                None
            }
        }
    }

    fn build_client(&self, session_id: SessionId) -> Arc<dyn PlayerClient> {
        Arc::new(LoggingPlayerClient { session_id })
    }

    fn build_decryption_service(&self) -> Arc<dyn DecryptionService> {
        Arc::new(ClearKeyDecryptionService)
    }
}

/// Logs every callback instead of forwarding it over a wire. Real delivery
/// to a connected client is the transport layer's job, not the core's.
struct LoggingPlayerClient {
    session_id: SessionId,
}

impl PlayerClient for LoggingPlayerClient {
    fn notify_playback_state(&self, state: PlaybackState) {
        debug!("session {}: playback state -> {state:?}", self.session_id);
    }

    fn notify_need_media_data(&self, source: SourceType) -> bool {
        debug!("session {}: need data for {source:?}", self.session_id);
        true
    }

    fn notify_position(&self, position_ns: u64) {
        trace!("session {}: position {position_ns}", self.session_id);
    }

    fn notify_network_state(&self, state: NetworkState) {
        debug!("session {}: network state -> {state:?}", self.session_id);
    }

    fn notify_buffer_underflow(&self, source: SourceType) {
        warn!("session {}: buffer underflow on {source:?}", self.session_id);
    }

    fn notify_source_flushed(&self, source: SourceType) {
        debug!("session {}: source flushed {source:?}", self.session_id);
    }

    fn invalidate_active_requests(&self, source: SourceType) {
        debug!("session {}: invalidate active requests {source:?}", self.session_id);
    }

    fn clear_active_requests_cache(&self) {
        debug!("session {}: clear active requests cache", self.session_id);
    }

    fn notify_qos(&self, source: SourceType, qos: QosInfo) {
        trace!("session {}: qos {source:?} {qos:?}", self.session_id);
    }
}

/// Placeholder decryption: the real key-session/CDM integration lives
/// outside this repository's scope, so this always returns the input bytes
/// unchanged rather than performing an actual decrypt.
struct ClearKeyDecryptionService;

impl DecryptionService for ClearKeyDecryptionService {
    fn decrypt(&self, data: &[u8], _descriptor: &EncryptionDescriptor) -> RialtoResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}
