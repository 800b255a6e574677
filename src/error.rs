//! Error taxonomy for framed endpoints.
//!
//! I/O failures, framing failures and construction failures are kept apart so
//! the relay can pick a policy per class instead of treating everything as a
//! dead socket.

use std::ops::Range;

use thiserror::Error;

/// Errors returned by [`FramedEndpoint`](crate::net::FramedEndpoint) operations.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The peer closed before any usable byte was transferred, or a send
    /// stalled past its retry budget. Terminal for the endpoint.
    #[error("connection broken")]
    ConnectionBroken,

    /// The peer closed mid-receive, or a send stalled part way. `content` is
    /// the part of the transfer buffer that did arrive (receive) or was
    /// written (send); the caller may still consume it. The session ends
    /// after forwarding it.
    #[error("connection broken after {} bytes", content.len())]
    PartialBroken { content: Range<usize> },

    /// The disguised header could not be trusted.
    #[error("malformed frame: {0}")]
    Parse(#[from] ParseError),

    /// Construction or handshake failure.
    #[error("endpoint setup failed: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Offset or length outside the transfer buffer window.
    #[error("range {offset}+{len} outside transfer window of {capacity} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// Any other socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while interpreting a disguised header block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Content-Length header not found")]
    MissingContentLength,

    #[error("no colon after Content-Length")]
    MissingColon,

    #[error("Content-Length has no numeric value")]
    MissingDigits,

    #[error("Content-Length value does not fit in usize")]
    LengthOverflow,

    /// Declared body does not fit what is left of the transfer buffer.
    #[error("declared content length {declared} exceeds {available} available bytes")]
    Oversize { declared: usize, available: usize },

    /// The header block filled the whole window without a terminator.
    #[error("header block exceeds {0} bytes without terminator")]
    HeaderTooLarge(usize),
}

/// Construction-time failures. None of these are retried by the endpoint.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("preamble of {len} bytes exceeds header budget of {budget} bytes (host name too long)")]
    PreambleTooLong { len: usize, budget: usize },

    #[error("cannot resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{host} resolved to no addresses")]
    NoAddresses { host: String },

    #[error("cannot connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {host}:{port} timed out")]
    ConnectTimeout { host: String, port: u16 },

    #[error("connection closed during handshake")]
    HandshakeClosed,

    #[error("handshake timed out after {transferred} of {expected} bytes")]
    HandshakeTimeout { transferred: usize, expected: usize },

    #[error("handshake is only performed by the {0} side")]
    WrongSide(&'static str),
}

/// Result alias for endpoint operations.
pub type Result<T> = std::result::Result<T, EndpointError>;
