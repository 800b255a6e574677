//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (connection limit, accept, wrap in the listener's mode)
//!     → endpoint.rs (FramedEndpoint, accept side)
//!
//! Outgoing TCP connection
//!     → endpoint.rs (resolve, connect, FramedEndpoint dial side)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Framing is chosen per endpoint and never changes afterwards

pub mod endpoint;
pub mod listener;

pub use endpoint::{DialTarget, FramedEndpoint, Received, Side, RAW_SOFT_CAP};
pub use listener::{Admitted, Listener, ListenerError, Slot};
