//! The per-session media-playback engine: one `Session` per client connection,
//! each with its own worker thread, bus dispatcher and `PlayerContext`. Scope
//! is per session, not per process — the supervisor in the `server` crate
//! owns the process-wide state.

pub mod client;
pub mod context;
pub mod data_reader;
pub mod decryption;
pub mod factory;
pub mod pipeline;
pub mod session_player;
pub mod shm;
pub mod task;
pub mod ticker;
pub mod worker;

#[cfg(feature = "gst")]
pub mod gst_pipeline;

mod bus;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub use bus::BusDispatcher;
pub use client::PlayerClient;
pub use context::PlayerContext;
pub use decryption::DecryptionService;
pub use factory::TaskFactory;
pub use pipeline::Pipeline;
pub use session_player::SessionPlayer;
pub use task::{Task, TaskScheduler};
pub use ticker::PositionTicker;
pub use worker::WorkerHandle;

/// Default margin the underflow watchdog tolerates before declaring an
/// audio stall.
pub const DEFAULT_UNDERFLOW_MARGIN: Duration = Duration::from_millis(500);

/// Default interval between position reports and underflow checks.
pub const DEFAULT_POSITION_REPORT_INTERVAL: Duration = Duration::from_millis(250);

/// A running session: its worker thread, bus dispatcher and the facade the
/// server crate drives. Dropping this does not join the worker thread —
/// callers should enqueue `shutdown()` on the facade and join explicitly if
/// an orderly wait is needed.
pub struct Session {
    pub player: SessionPlayer,
    worker_join: Option<JoinHandle<()>>,
    bus: Option<BusDispatcher>,
    ticker: Option<PositionTicker>,
}

impl Session {
    /// Wires up a session's worker thread, bus dispatcher, position ticker
    /// and facade around a concrete `Pipeline`, exactly as the Playback
    /// Service supervisor does per session.
    pub fn spawn(
        session_id: u64,
        pipeline: Arc<dyn Pipeline>,
        client: Arc<dyn PlayerClient>,
        decryption_service: Arc<dyn DecryptionService>,
        underflow_margin: Duration,
    ) -> Self {
        let mut ctx = PlayerContext::new(decryption_service);
        ctx.pipeline = Some(pipeline.clone());

        let (worker, worker_join) = worker::spawn(ctx, client, format!("rialto-worker-{session_id}"));
        pipeline.attach_scheduler(Arc::new(worker.clone()));
        let bus = BusDispatcher::spawn(pipeline.clone(), worker.clone(), format!("rialto-bus-{session_id}"));
        let ticker = PositionTicker::spawn(
            worker.clone(),
            DEFAULT_POSITION_REPORT_INTERVAL,
            underflow_margin,
            format!("rialto-ticker-{session_id}"),
        );
        let factory = TaskFactory::new(underflow_margin);
        let player = SessionPlayer::new(worker, factory, pipeline);

        Self {
            player,
            worker_join: Some(worker_join),
            bus: Some(bus),
            ticker: Some(ticker),
        }
    }

    /// Enqueues `Shutdown`, stops the bus dispatcher and ticker, and joins
    /// the worker thread. Blocks until all have exited.
    pub fn shutdown(&mut self) {
        self.player.shutdown();
        if let Some(mut bus) = self.bus.take() {
            bus.stop();
        }
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
        if let Some(join) = self.worker_join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.worker_join.is_some() {
            self.shutdown();
        }
    }
}
