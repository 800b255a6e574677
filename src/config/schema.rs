//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tunnel.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::framing::{Mode, DEFAULT_BUFFER_SIZE};

/// Root configuration for one tunnel instance.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TunnelConfig {
    /// Accept side: where clients connect and how their bytes are framed.
    pub listener: ListenerConfig,

    /// Dial side: where every accepted connection is forwarded.
    pub remote: RemoteConfig,

    /// Buffer and wait budgets for endpoint I/O.
    pub io: IoConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Framing used on accepted connections.
    pub mode: Mode,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Echo the dialing peer's handshake probe. Only used in disguised mode.
    pub answer_handshake: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            mode: Mode::Raw,
            max_connections: 1024,
            answer_handshake: true,
        }
    }
}

/// Remote (dial side) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Host name or address to dial.
    pub host: String,

    /// Port to dial.
    pub port: u16,

    /// Framing used towards the remote host.
    pub mode: Mode,

    /// Path placed in the disguised request line.
    pub request_path: String,

    /// Send the handshake probe after connecting. Only used in disguised mode.
    pub handshake: bool,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Connect attempts before a client connection is dropped.
    pub connect_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub backoff_base_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 80,
            mode: Mode::Disguised,
            request_path: String::new(),
            handshake: true,
            connect_timeout_secs: 5,
            connect_attempts: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 2000,
        }
    }
}

/// Endpoint I/O budgets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IoConfig {
    /// Transfer buffer capacity per session.
    pub buffer_size: usize,

    /// Wait per receive attempt in milliseconds.
    pub wait_ms: u64,

    /// Consecutive empty receive attempts before a receive gives up.
    pub max_retries: u32,

    /// Wait per send attempt in milliseconds.
    pub send_wait_ms: u64,

    /// Consecutive stalled send attempts before the peer is declared gone.
    pub send_max_retries: u32,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            wait_ms: 5,
            max_retries: 10,
            send_wait_ms: 50,
            send_max_retries: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
