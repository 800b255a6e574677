//! HTTP-disguised TCP tunnel library.
//!
//! Accepts TCP connections, dials a remote host for each one and relays
//! bytes between them. Either side can carry payloads raw or wrapped in
//! HTTP-looking `Content-Length` framed messages.

pub mod config;
pub mod error;
pub mod framing;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod resilience;

pub use config::schema::TunnelConfig;
pub use error::{ConfigurationError, EndpointError, ParseError};
pub use framing::{Mode, TransferBuffer};
pub use lifecycle::Shutdown;
pub use net::{DialTarget, FramedEndpoint, Received};
pub use relay::TunnelServer;
pub use resilience::RetryPolicy;
