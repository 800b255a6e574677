//! Shutdown coordination for the tunnel.
//!
//! The accept loop and every session hold a [`ShutdownSignal`]. The trigger is
//! latched, so a signal taken after it has fired resolves at once and a
//! session spawned during shutdown ends without relaying anything.

use std::sync::Arc;

use tokio::sync::watch;

/// Owner side: clone it into whatever may start shutdown.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// A new signal for the accept loop or a session.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire every signal, including ones taken later. Repeat calls do nothing.
    pub fn trigger(&self) {
        self.tx.send_if_modified(|triggered| !std::mem::replace(triggered, true));
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Signals still held by the accept loop and live sessions.
    pub fn live_signals(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown is triggered. Also resolves when every
    /// [`Shutdown`] handle is gone, since nothing could trigger it any more.
    pub async fn fired(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn has_fired(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_fires_on_trigger() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        assert_eq!(shutdown.live_signals(), 1);

        let waiter = tokio::spawn(async move { signal.fired().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn late_signal_sees_earlier_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());

        let mut late = shutdown.signal();
        assert!(late.has_fired());
        tokio::time::timeout(Duration::from_millis(100), late.fired())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropping_every_owner_releases_waiters() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        drop(shutdown);
        tokio::time::timeout(Duration::from_millis(100), signal.fired())
            .await
            .unwrap();
        assert!(!signal.has_fired());
    }
}
