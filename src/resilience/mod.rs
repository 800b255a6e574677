//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Socket read/write on an endpoint:
//!     → retries.rs (timed wait per attempt, bounded run of idle attempts)
//!
//! Dialing the remote host:
//!     → backoff.rs (exponential delay with jitter between connect attempts)
//! ```
//!
//! # Design Decisions
//! - Every wait is a real timer; nothing spins on a non-blocking socket
//! - Budgets are parameters handed to each call, never hidden constants
//! - A peer close is final and never retried

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::{IdleCounter, RetryPolicy};
