//! Turns accepted `NamedSocket` connections into calls against the
//! `PlaybackService`. The wire protocol itself (message framing, RPC schema)
//! is explicitly out of scope: the core only needs a message-delivery
//! contract, so this module stops at that contract — a `ConnectionHandler`
//! trait — rather than inventing a protobuf-shaped codec.

use std::os::fd::OwnedFd;
use std::sync::Arc;

use crate::supervisor::PlaybackService;

pub trait ConnectionHandler: Send + Sync {
    fn on_connected(&self, service: &Arc<PlaybackService>, conn: OwnedFd);
}

/// Accepts and immediately closes connections, logging each one. Stands in
/// for the RPC transport this repository's core does not implement.
pub struct LoggingConnectionHandler;

impl ConnectionHandler for LoggingConnectionHandler {
    fn on_connected(&self, service: &Arc<PlaybackService>, conn: OwnedFd) {
        use std::os::fd::AsRawFd;
        info!(
            "accepted connection fd={} (active sessions: {})",
            conn.as_raw_fd(),
            service.session_count()
        );
        drop(conn);
    }
}

/// Runs the accept loop on the calling thread until `NamedSocket::accept`
/// returns an error (socket closed via `block_new_connections` or process
/// shutdown).
pub fn run_accept_loop(
    socket: &crate::socket::NamedSocket,
    service: Arc<PlaybackService>,
    handler: Arc<dyn ConnectionHandler>,
) {
    loop {
        match socket.accept() {
            Ok(conn) => {
                let service = service.clone();
                let handler = handler.clone();
                std::thread::spawn(move || handler.on_connected(&service, conn));
            }
            Err(err) => {
                warn!("accept loop exiting: {err}");
                break;
            }
        }
    }
}
