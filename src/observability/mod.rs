//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoints and sessions produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout log stream
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Connection ids flow through every session log event
//! - Metrics are cheap (atomic increments) and off by default

pub mod logging;
pub mod metrics;
