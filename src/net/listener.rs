//! Accept side of the tunnel.
//!
//! # Responsibilities
//! - Bind the configured address
//! - Hold a slot from the connection limit before taking the next client
//! - Wrap each client as an accept-side [`FramedEndpoint`] in the listener's mode

use std::io;
use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;
use crate::error::EndpointError;
use crate::framing::Mode;
use crate::net::FramedEndpoint;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid bind address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: AddrParseError,
    },

    #[error("cannot bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// One failed accept. The listener stays usable.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The client could not be wrapped as an endpoint. The listener stays usable.
    #[error("cannot frame accepted client: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("connection limit closed")]
    Closed,
}

impl ListenerError {
    /// True when only the current client is lost.
    pub fn is_per_client(&self) -> bool {
        matches!(self, ListenerError::Accept(_) | ListenerError::Endpoint(_))
    }
}

/// A client ready for the relay: framed, addressed, and counted against the
/// connection limit until `slot` is dropped.
#[derive(Debug)]
pub struct Admitted {
    pub endpoint: FramedEndpoint,
    pub peer: SocketAddr,
    pub slot: Slot,
}

/// One unit of the connection limit.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

pub struct Listener {
    inner: TcpListener,
    mode: Mode,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let address: SocketAddr =
            config
                .bind_address
                .parse()
                .map_err(|source| ListenerError::Address {
                    address: config.bind_address.clone(),
                    source,
                })?;
        let inner = TcpListener::bind(address)
            .await
            .map_err(|source| ListenerError::Bind { address, source })?;

        tracing::info!(
            address = %inner.local_addr().unwrap_or(address),
            mode = %config.mode,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner,
            mode: config.mode,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            capacity: config.max_connections,
        })
    }

    /// Wait for a free slot, then for a client.
    pub async fn admit(&self) -> Result<Admitted, ListenerError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, peer) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer_addr = %peer, error = %e, "Could not disable Nagle");
        }
        let endpoint = FramedEndpoint::accepted(stream, self.mode)?.with_peer(peer);

        tracing::debug!(
            peer_addr = %peer,
            mode = %self.mode,
            free_slots = self.slots.available_permits(),
            "Client admitted"
        );
        Ok(Admitted {
            endpoint,
            peer,
            slot: Slot { _permit: permit },
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpStream;

    fn local(mode: Mode, max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            mode,
            max_connections,
            ..ListenerConfig::default()
        }
    }

    #[tokio::test]
    async fn admitted_clients_use_listener_mode() {
        let listener = Listener::bind(&local(Mode::Disguised, 4)).await.unwrap();
        assert_eq!(listener.mode(), Mode::Disguised);
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let admitted = listener.admit().await.unwrap();
        assert_eq!(admitted.endpoint.mode(), Mode::Disguised);
        assert_eq!(admitted.endpoint.side(), crate::net::Side::Accepted);
        assert_eq!(admitted.endpoint.peer_addr(), Some(client.local_addr().unwrap()));
        assert_eq!(admitted.peer, client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn full_listener_waits_for_a_slot() {
        let listener = Listener::bind(&local(Mode::Raw, 1)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(listener.capacity(), 1);

        let _first_client = TcpStream::connect(addr).await.unwrap();
        let first = listener.admit().await.unwrap();
        assert_eq!(listener.free_slots(), 0);

        let _second_client = TcpStream::connect(addr).await.unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), listener.admit())
                .await
                .is_err()
        );

        drop(first);
        assert_eq!(listener.free_slots(), 1);
        let second = tokio::time::timeout(Duration::from_secs(1), listener.admit())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.endpoint.mode(), Mode::Raw);
    }

    #[tokio::test]
    async fn bad_address_is_reported() {
        let config = ListenerConfig {
            bind_address: "not-an-address".to_string(),
            ..ListenerConfig::default()
        };
        match Listener::bind(&config).await {
            Err(ListenerError::Address { address, .. }) => assert_eq!(address, "not-an-address"),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn per_client_errors_do_not_stop_the_listener() {
        let accept = ListenerError::Accept(io::Error::from(io::ErrorKind::ConnectionAborted));
        assert!(accept.is_per_client());
        assert!(ListenerError::Endpoint(EndpointError::ConnectionBroken).is_per_client());
        assert!(!ListenerError::Closed.is_per_client());
    }
}
