//! Live-session bookkeeping for the tunnel server.
//!
//! Every admitted client gets a [`SessionGuard`] before setup starts. The
//! guard keeps the live count right whichever way the connection ends, and
//! folds the session's [`SessionStats`] into running totals when it is
//! finished. Shutdown waits on the live count to drain.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::relay::{SessionEnd, SessionStats};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identifier carried by every log event of one relayed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Totals {
    live: AtomicU64,
    relayed: AtomicU64,
    malformed: AtomicU64,
    setup_failures: AtomicU64,
    bytes_up: AtomicU64,
    bytes_down: AtomicU64,
    frames_up: AtomicU64,
    frames_down: AtomicU64,
}

/// Point-in-time copy of the tracker's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub live: u64,
    /// Sessions that reached the relay stage and have ended.
    pub relayed: u64,
    /// Of those, sessions ended by an unparsable disguised header.
    pub malformed: u64,
    /// Clients dropped before relaying (handshake or dial failed).
    pub setup_failures: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub frames_up: u64,
    pub frames_down: u64,
}

/// Shared, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    totals: Arc<Totals>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a newly admitted client as live.
    pub fn open(&self, peer: SocketAddr) -> SessionGuard {
        self.totals.live.fetch_add(1, Ordering::SeqCst);
        SessionGuard {
            id: SessionId::next(),
            peer,
            totals: Arc::clone(&self.totals),
        }
    }

    pub fn live(&self) -> u64 {
        self.totals.live.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let t = &self.totals;
        TrackerSnapshot {
            live: t.live.load(Ordering::SeqCst),
            relayed: t.relayed.load(Ordering::Relaxed),
            malformed: t.malformed.load(Ordering::Relaxed),
            setup_failures: t.setup_failures.load(Ordering::Relaxed),
            bytes_up: t.bytes_up.load(Ordering::Relaxed),
            bytes_down: t.bytes_down.load(Ordering::Relaxed),
            frames_up: t.frames_up.load(Ordering::Relaxed),
            frames_down: t.frames_down.load(Ordering::Relaxed),
        }
    }

    /// Wait until no session is live or `deadline` passes.
    /// Returns true when everything drained.
    pub async fn wait_for_drain(&self, deadline: Duration) -> bool {
        let drained = async {
            while self.live() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// One admitted client. Dropping it, however the connection ended, takes it
/// off the live count.
#[derive(Debug)]
pub struct SessionGuard {
    id: SessionId,
    peer: SocketAddr,
    totals: Arc<Totals>,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Fold a relayed session's outcome into the totals.
    pub fn finish(self, end: &SessionEnd, stats: &SessionStats) {
        let t = &self.totals;
        t.relayed.fetch_add(1, Ordering::Relaxed);
        if matches!(end, SessionEnd::Malformed(_)) {
            t.malformed.fetch_add(1, Ordering::Relaxed);
        }
        t.bytes_up.fetch_add(stats.bytes_up, Ordering::Relaxed);
        t.bytes_down.fetch_add(stats.bytes_down, Ordering::Relaxed);
        t.frames_up.fetch_add(stats.frames_up, Ordering::Relaxed);
        t.frames_down.fetch_add(stats.frames_down, Ordering::Relaxed);
    }

    /// The client was dropped before a session could start.
    pub fn setup_failed(self) {
        self.totals.setup_failures.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.totals.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    fn peer() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn ids_are_distinct_and_readable() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("session-"));
    }

    #[test]
    fn finished_sessions_add_up() {
        let tracker = SessionTracker::new();
        let first = tracker.open(peer());
        let second = tracker.open(peer());
        assert_eq!(tracker.live(), 2);
        assert_eq!(first.peer(), peer());

        let stats = SessionStats {
            bytes_up: 10,
            bytes_down: 30,
            frames_up: 1,
            frames_down: 2,
        };
        first.finish(&SessionEnd::Closed, &stats);
        second.finish(&SessionEnd::Malformed(ParseError::MissingColon), &stats);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.live, 0);
        assert_eq!(snapshot.relayed, 2);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.bytes_up, 20);
        assert_eq!(snapshot.bytes_down, 60);
        assert_eq!(snapshot.frames_down, 4);
    }

    #[test]
    fn setup_failures_leave_no_live_session() {
        let tracker = SessionTracker::new();
        tracker.open(peer()).setup_failed();
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.live, 0);
        assert_eq!(snapshot.setup_failures, 1);
        assert_eq!(snapshot.relayed, 0);
    }

    #[tokio::test]
    async fn drain_waits_for_live_guards() {
        let tracker = SessionTracker::new();
        let guard = tracker.open(peer());
        assert!(!tracker.wait_for_drain(Duration::from_millis(20)).await);
        drop(guard);
        assert!(tracker.wait_for_drain(Duration::from_millis(200)).await);
    }
}
