//! Disguised header templates and the staging buffer used to send them.

use crate::error::ConfigurationError;

/// Capacity of the header staging buffer.
pub const HEADER_BUDGET: usize = 256;

/// Worst case for `": " + <usize digits> + "\r\n\r\n"`.
const LENGTH_FIELD_MAX: usize = 2 + 20 + 4;

/// Length of the handshake probe and of the expected reply.
pub const HANDSHAKE_LEN: usize = 18;

/// Request line sent by the dialing side before any payload.
pub const HANDSHAKE_PROBE: &[u8; HANDSHAKE_LEN] = b"GET / HTTP/1.1\r\n\r\n";

const RESPONSE_PREAMBLE: &str = "HTTP/1.1 200 OK\r\nContent-Length";

/// Fixed part of a disguised header, up to the `Content-Length` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preamble {
    /// Dial side: looks like a request to `host:port`.
    Request {
        path: String,
        host: String,
        port: u16,
    },
    /// Accept side: looks like a `200 OK` response.
    Response,
}

impl Preamble {
    /// Render the template. Ends right before the colon.
    pub fn render(&self) -> Vec<u8> {
        match self {
            Preamble::Request { path, host, port } => format!(
                "GET {} / HTTP/1.0\r\nHost: {}:{}\r\nContent-Length",
                path, host, port
            )
            .into_bytes(),
            Preamble::Response => RESPONSE_PREAMBLE.as_bytes().to_vec(),
        }
    }
}

/// Owns the rendered preamble and a fixed-capacity scratch buffer in which
/// complete headers are composed before being written.
#[derive(Debug)]
pub struct HeaderWriter {
    preamble: Vec<u8>,
    scratch: Vec<u8>,
}

impl HeaderWriter {
    /// Fails when the longest possible header would not fit the budget.
    pub fn new(preamble: &Preamble) -> Result<Self, ConfigurationError> {
        let preamble = preamble.render();
        let worst_case = preamble.len() + LENGTH_FIELD_MAX;
        if worst_case > HEADER_BUDGET {
            return Err(ConfigurationError::PreambleTooLong {
                len: preamble.len(),
                budget: HEADER_BUDGET - LENGTH_FIELD_MAX,
            });
        }
        Ok(Self {
            preamble,
            scratch: Vec::with_capacity(HEADER_BUDGET),
        })
    }

    pub fn preamble(&self) -> &[u8] {
        &self.preamble
    }

    /// Compose `<preamble>: <content_length>\r\n\r\n` into the scratch buffer.
    pub fn compose(&mut self, content_length: usize) -> &[u8] {
        self.scratch.clear();
        self.scratch.extend_from_slice(&self.preamble);
        self.scratch.extend_from_slice(b": ");
        push_decimal(&mut self.scratch, content_length);
        self.scratch.extend_from_slice(b"\r\n\r\n");
        &self.scratch
    }
}

fn push_decimal(out: &mut Vec<u8>, mut value: usize) {
    let mut digits = [0u8; 20];
    let mut pos = digits.len();
    loop {
        pos -= 1;
        digits[pos] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    out.extend_from_slice(&digits[pos..]);
}
