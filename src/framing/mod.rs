//! Disguised-mode framing subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing payload
//!     → preamble.rs (HeaderWriter stages "<preamble>: <len>\r\n\r\n")
//!     → payload bytes from the TransferBuffer window
//!
//! Incoming bytes
//!     → buffer.rs (bounded window starting at the caller's offset)
//!     → scanner.rs (resumable search for "\r\n\r\n")
//!     → content_length.rs (Content-Length value from the header block)
//!     → content region handed back to the caller
//! ```
//!
//! Nothing here touches a socket; the endpoint drives these pieces.

pub mod buffer;
pub mod content_length;
pub mod preamble;
pub mod scanner;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use buffer::{TransferBuffer, DEFAULT_BUFFER_SIZE, RESERVED_SLACK};
pub use content_length::parse_content_length;
pub use preamble::{HeaderWriter, Preamble, HANDSHAKE_LEN, HANDSHAKE_PROBE, HEADER_BUDGET};
pub use scanner::{find_header_end, HeaderScanner};

/// Transport mode of an endpoint. Fixed for the endpoint's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Payload bytes go on the wire unmodified.
    #[default]
    Raw,
    /// Payload is wrapped in an HTTP-looking, `Content-Length` framed message.
    Disguised,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Raw => write!(f, "raw"),
            Mode::Disguised => write!(f, "disguised"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "plain" => Ok(Mode::Raw),
            "disguised" | "http" => Ok(Mode::Disguised),
            other => Err(format!("unknown mode '{}', expected raw or disguised", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("raw".parse::<Mode>().unwrap(), Mode::Raw);
        assert_eq!("PLAIN".parse::<Mode>().unwrap(), Mode::Raw);
        assert_eq!("Disguised".parse::<Mode>().unwrap(), Mode::Disguised);
        assert_eq!("http".parse::<Mode>().unwrap(), Mode::Disguised);
        assert!("tls".parse::<Mode>().is_err());
    }

    #[test]
    fn mode_display_matches_config_spelling() {
        assert_eq!(Mode::Raw.to_string(), "raw");
        assert_eq!(Mode::Disguised.to_string(), "disguised");
    }
}
