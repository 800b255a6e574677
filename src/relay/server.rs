//! Accept loop and per-connection setup.
//!
//! # Responsibilities
//! - Accept clients from the bounded [`Listener`]
//! - Answer the disguised handshake on the accept side when configured
//! - Dial the remote host, retrying with jittered backoff
//! - Hand both endpoints to a [`Session`] and track it until it ends
//! - Drain live sessions on shutdown

use std::sync::Arc;
use std::time::Duration;

use crate::config::{RemoteConfig, TunnelConfig};
use crate::error::{ConfigurationError, EndpointError, Result};
use crate::framing::Mode;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::{Admitted, DialTarget, FramedEndpoint, Listener, ListenerError};
use crate::observability::metrics;
use crate::relay::tracker::{SessionId, SessionTracker};
use crate::relay::{Session, SessionEnd, SessionStats};
use crate::resilience::{calculate_backoff, RetryPolicy};

/// How long shutdown waits for live sessions before giving up on them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Relays every accepted connection to the configured remote host.
pub struct TunnelServer {
    config: Arc<TunnelConfig>,
    tracker: SessionTracker,
}

impl TunnelServer {
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config: Arc::new(config),
            tracker: SessionTracker::new(),
        }
    }

    /// Handle on the session totals; stays valid after `run` consumes the server.
    pub fn tracker(&self) -> SessionTracker {
        self.tracker.clone()
    }

    /// Run the accept loop until `shutdown` fires, then wait for sessions.
    pub async fn run(self, listener: Listener, shutdown: Shutdown) -> std::result::Result<(), ListenerError> {
        let mut stop = shutdown.signal();
        tracing::info!(
            remote_host = %self.config.remote.host,
            remote_port = self.config.remote.port,
            listen_mode = %listener.mode(),
            remote_mode = %self.config.remote.mode,
            max_connections = listener.capacity(),
            "Tunnel server running"
        );

        loop {
            let admitted = tokio::select! {
                admitted = listener.admit() => admitted,
                _ = stop.fired() => {
                    tracing::info!("Accept loop stopping");
                    break;
                }
            };

            let Admitted { endpoint, peer, slot } = match admitted {
                Ok(admitted) => admitted,
                Err(e) if e.is_per_client() => {
                    tracing::warn!(error = %e, "Client not admitted");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let config = Arc::clone(&self.config);
            let guard = self.tracker.open(peer);
            let signal = shutdown.signal();
            tokio::spawn(async move {
                let _slot = slot;
                let id = guard.id();
                match serve_connection(config, endpoint, id, signal).await {
                    Ok((end, stats)) => guard.finish(&end, &stats),
                    Err(e) => {
                        tracing::warn!(session_id = %id, peer_addr = %guard.peer(), error = %e, "Session setup failed");
                        guard.setup_failed();
                    }
                }
            });
        }

        let live = self.tracker.live();
        if live > 0 {
            tracing::info!(live, "Waiting for sessions to drain");
            if !self.tracker.wait_for_drain(DRAIN_TIMEOUT).await {
                tracing::warn!(remaining = self.tracker.live(), "Drain timeout reached, abandoning sessions");
            }
        }

        let totals = self.tracker.snapshot();
        tracing::info!(
            relayed = totals.relayed,
            malformed = totals.malformed,
            setup_failures = totals.setup_failures,
            bytes_up = totals.bytes_up,
            bytes_down = totals.bytes_down,
            "Tunnel server stopped"
        );
        Ok(())
    }
}

/// Handshake, dial and relay for one admitted client.
pub async fn serve_connection(
    config: Arc<TunnelConfig>,
    mut local: FramedEndpoint,
    id: SessionId,
    shutdown: ShutdownSignal,
) -> Result<(SessionEnd, SessionStats)> {
    let receive = RetryPolicy::for_receive(&config.io);
    let send = RetryPolicy::for_send(&config.io);

    if local.mode() == Mode::Disguised && config.listener.answer_handshake {
        if let Err(e) = local.answer_handshake(&send).await {
            local.close().await;
            return Err(e);
        }
    }

    let mut remote = match connect_with_backoff(&config.remote).await {
        Ok(remote) => remote,
        Err(e) => {
            local.close().await;
            return Err(e);
        }
    };
    if remote.mode() == Mode::Disguised && config.remote.handshake {
        if let Err(e) = remote.handshake(&send).await {
            local.close().await;
            remote.close().await;
            return Err(e);
        }
    }

    metrics::session_opened();
    let session = Session::new(id, local, remote, config.io.buffer_size, receive, send);
    let outcome = session.run(shutdown).await;
    metrics::session_closed();
    Ok(outcome)
}

/// Dial the remote host, retrying transient failures with jittered backoff.
pub async fn connect_with_backoff(remote: &RemoteConfig) -> Result<FramedEndpoint> {
    let target = DialTarget::new(&remote.host, remote.port).with_path(&remote.request_path);
    let connect_timeout = Duration::from_secs(remote.connect_timeout_secs);
    let attempts = remote.connect_attempts.max(1);

    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match FramedEndpoint::connect(&target, remote.mode, connect_timeout).await {
            Ok(endpoint) => return Ok(endpoint),
            Err(e) => e,
        };
        metrics::record_connect_failure();

        if !is_retryable(&err) || attempt >= attempts {
            tracing::error!(
                host = %remote.host,
                port = remote.port,
                attempt,
                error = %err,
                "Giving up on remote"
            );
            return Err(err);
        }

        let delay = calculate_backoff(attempt, remote.backoff_base_ms, remote.backoff_max_ms);
        tracing::warn!(
            host = %remote.host,
            port = remote.port,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Connect failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

fn is_retryable(err: &EndpointError) -> bool {
    matches!(
        err,
        EndpointError::Io(_)
            | EndpointError::Configuration(
                ConfigurationError::Resolve { .. }
                    | ConfigurationError::NoAddresses { .. }
                    | ConfigurationError::Connect { .. }
                    | ConfigurationError::ConnectTimeout { .. }
            )
    )
}
