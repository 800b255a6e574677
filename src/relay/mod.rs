//! Relay subsystem: pairs an accepted endpoint with a dialed one and copies
//! messages between them.
//!
//! # Data Flow
//! ```text
//! Listener accepts client
//!     → tracker.rs (session id, live count)
//!     → server.rs (answer handshake, dial remote with backoff, handshake)
//!     → session.rs (alternate: local.receive → remote.send,
//!                              remote.receive → local.send)
//!     → both endpoints closed when either side breaks
//!     → tracker.rs (stats folded into the server totals)
//! ```
//!
//! # Design Decisions
//! - One flow per session; each endpoint is only touched by its session
//! - Malformed disguised frames end the session; the stream cannot be resynced
//! - Shutdown cancels sessions between or during transfers

pub mod server;
pub mod session;
pub mod tracker;

use std::fmt;

pub use server::{connect_with_backoff, serve_connection, TunnelServer};
pub use session::{Session, SessionEnd, SessionStats};
pub use tracker::{SessionGuard, SessionId, SessionTracker, TrackerSnapshot};

/// Direction of a relayed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Accepted side towards the remote host.
    Upstream,
    /// Remote host back to the accepted side.
    Downstream,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
