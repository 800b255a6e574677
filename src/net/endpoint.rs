//! Framed endpoint: one connection, one transport mode.
//!
//! # Responsibilities
//! - Own the connection handle and release it exactly once
//! - Receive one logical message into a caller-owned transfer buffer
//! - Send a payload, wrapping it in a disguised header when required
//! - Perform the dial-side handshake (and answer it on the accept side)
//!
//! # Receive contract
//! - `Ok(None)`: no complete message within the retry budget. A disguised
//!   frame that was only partly read is kept and finished by a later call
//! - `Ok(Some(received))`: `received.content` is the payload inside the buffer
//! - `Err(PartialBroken)`: the peer closed mid-message; the range still holds
//!   what arrived
//! - `Err(ConnectionBroken)`: the peer closed before any content arrived
//!
//! Per-call progress (idle counts, scanner state) lives in locals. Bytes that
//! belong to a frame not yet returned are parked on the endpoint: the tail of
//! a frame read past its end, or an unfinished frame when the peer pauses.

use std::io;
use std::net::SocketAddr;
use std::ops::Range;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use crate::error::{ConfigurationError, EndpointError, ParseError, Result};
use crate::framing::{
    parse_content_length, HeaderScanner, HeaderWriter, Mode, Preamble, TransferBuffer,
    HANDSHAKE_LEN, HANDSHAKE_PROBE,
};
use crate::resilience::{IdleCounter, RetryPolicy};

/// Raw receives stop accumulating once this many bytes are in hand.
pub const RAW_SOFT_CAP: usize = 500;

/// Which end of the tunnel created the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Accepted from a listener; disguised frames look like responses.
    Accepted,
    /// Dialed to a remote host; disguised frames look like requests.
    Dialed,
}

/// Remote host an endpoint dials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    pub host: String,
    pub port: u16,
    /// Path placed in the disguised request line.
    pub path: String,
}

impl DialTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: String::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    fn preamble(&self) -> Preamble {
        Preamble::Request {
            path: self.path.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Location of a received payload inside the transfer buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub content: Range<usize>,
}

impl Received {
    pub fn start(&self) -> usize {
        self.content.start
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Result of one attempt on the socket.
enum Attempt {
    Moved(usize),
    Closed,
    Idle,
}

/// Why a bounded transfer loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Complete,
    PeerClosed,
    Stalled,
}

/// A connection plus the framing rules for its mode.
#[derive(Debug)]
pub struct FramedEndpoint<S = TcpStream> {
    stream: Option<S>,
    mode: Mode,
    side: Side,
    header: HeaderWriter,
    peer: Option<SocketAddr>,
    /// Bytes of disguised frames read but not yet returned.
    carry: Vec<u8>,
}

impl<S> FramedEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an accepted connection. Disguised frames use the response preamble.
    pub fn accepted(stream: S, mode: Mode) -> Result<Self> {
        let header = HeaderWriter::new(&Preamble::Response)?;
        Ok(Self::from_parts(stream, mode, Side::Accepted, header))
    }

    /// Wrap an already-connected stream as the dial side of `target`.
    pub fn dialed(stream: S, mode: Mode, target: &DialTarget) -> Result<Self> {
        let header = HeaderWriter::new(&target.preamble())?;
        Ok(Self::from_parts(stream, mode, Side::Dialed, header))
    }

    fn from_parts(stream: S, mode: Mode, side: Side, header: HeaderWriter) -> Self {
        tracing::debug!(mode = %mode, side = ?side, "Endpoint created");
        Self {
            stream: Some(stream),
            mode,
            side,
            header,
            peer: None,
            carry: Vec::new(),
        }
    }

    /// Attach the peer address used in log events.
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn preamble(&self) -> &[u8] {
        self.header.preamble()
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Receive one message into `buf` starting at `from`.
    pub async fn receive(
        &mut self,
        buf: &mut TransferBuffer,
        from: usize,
        policy: &RetryPolicy,
    ) -> Result<Option<Received>> {
        match self.mode {
            Mode::Raw => self.receive_raw(buf, from, policy).await,
            Mode::Disguised => self.receive_disguised(buf, from, policy).await,
        }
    }

    async fn receive_raw(
        &mut self,
        buf: &mut TransferBuffer,
        from: usize,
        policy: &RetryPolicy,
    ) -> Result<Option<Received>> {
        let stream = self.stream.as_mut().ok_or(EndpointError::ConnectionBroken)?;
        let window = buf.window_mut(from)?;
        let mut idle = IdleCounter::new(policy);
        let mut read = 0;
        let mut closed = false;

        while read < RAW_SOFT_CAP && read < window.len() {
            match read_attempt(stream, &mut window[read..], policy.wait).await? {
                Attempt::Moved(n) => {
                    read += n;
                    idle.reset();
                }
                Attempt::Closed => {
                    closed = true;
                    break;
                }
                // Once data is pending a single quiet wait ends the message.
                Attempt::Idle if read > 0 => break,
                Attempt::Idle => {
                    if !idle.record_idle() {
                        break;
                    }
                }
            }
        }

        tracing::trace!(peer = ?self.peer, bytes = read, closed, "Raw receive");
        match (read, closed) {
            (0, true) => {
                tracing::debug!(peer = ?self.peer, "Raw connection closed by peer");
                Err(EndpointError::ConnectionBroken)
            }
            (0, false) => Ok(None),
            _ => Ok(Some(Received {
                content: from..from + read,
            })),
        }
    }

    async fn receive_disguised(
        &mut self,
        buf: &mut TransferBuffer,
        from: usize,
        policy: &RetryPolicy,
    ) -> Result<Option<Received>> {
        let stream = self.stream.as_mut().ok_or(EndpointError::ConnectionBroken)?;
        let window = buf.window_mut(from)?;

        let mut filled = take_carry(&mut self.carry, window);
        let mut scanner = HeaderScanner::new();
        let mut header_end = scanner.feed(&window[..filled]);
        let mut idle = IdleCounter::new(policy);
        let mut closed = false;

        while header_end.is_none() {
            if filled == window.len() {
                return Err(ParseError::HeaderTooLarge(filled).into());
            }
            match read_attempt(stream, &mut window[filled..], policy.wait).await? {
                Attempt::Moved(n) => {
                    header_end = scanner.feed(&window[filled..filled + n]);
                    filled += n;
                    idle.reset();
                }
                Attempt::Closed => {
                    closed = true;
                    break;
                }
                Attempt::Idle => {
                    if !idle.record_idle() {
                        break;
                    }
                }
            }
        }

        let Some(header_end) = header_end else {
            if closed {
                tracing::debug!(peer = ?self.peer, header_bytes = filled, "Disguised connection closed by peer");
                return Err(EndpointError::ConnectionBroken);
            }
            if filled > 0 {
                tracing::debug!(peer = ?self.peer, header_bytes = filled, "Header incomplete, resuming on next receive");
                park(&mut self.carry, &window[..filled]);
            }
            return Ok(None);
        };

        let declared = parse_content_length(&window[..header_end]).inspect_err(|e| {
            tracing::warn!(peer = ?self.peer, error = %e, "Unparsable disguised header");
        })?;
        let available = window.len() - header_end;
        if declared > available {
            tracing::warn!(peer = ?self.peer, declared, available, "Declared content exceeds buffer");
            return Err(ParseError::Oversize { declared, available }.into());
        }
        tracing::debug!(peer = ?self.peer, header_bytes = header_end, content_length = declared, "Header parsed");

        let content_end = header_end + declared;
        if filled > content_end {
            park(&mut self.carry, &window[content_end..filled]);
            filled = content_end;
        }

        idle.reset();
        let mut closed = false;
        while filled < content_end {
            match read_attempt(stream, &mut window[filled..content_end], policy.wait).await? {
                Attempt::Moved(n) => {
                    filled += n;
                    idle.reset();
                }
                Attempt::Closed => {
                    closed = true;
                    break;
                }
                Attempt::Idle => {
                    if !idle.record_idle() {
                        break;
                    }
                }
            }
        }

        let content = from + header_end..from + filled;
        if filled < content_end {
            if !closed {
                // The peer is still there; keep the frame so far for the next call.
                tracing::debug!(
                    peer = ?self.peer,
                    received = content.len(),
                    declared,
                    "Content incomplete, resuming on next receive"
                );
                park(&mut self.carry, &window[..filled]);
                return Ok(None);
            }
            tracing::debug!(peer = ?self.peer, received = content.len(), declared, "Peer closed mid-content");
            if content.is_empty() {
                return Err(EndpointError::ConnectionBroken);
            }
            return Err(EndpointError::PartialBroken { content });
        }

        Ok(Some(Received { content }))
    }

    /// Send `len` payload bytes from `buf` at `from`. Returns payload bytes
    /// written; disguised header bytes are not counted.
    pub async fn send(
        &mut self,
        buf: &TransferBuffer,
        from: usize,
        len: usize,
        policy: &RetryPolicy,
    ) -> Result<usize> {
        let payload = buf.get(from, len)?;
        let stream = self.stream.as_mut().ok_or(EndpointError::ConnectionBroken)?;

        if self.mode == Mode::Disguised {
            let header = self.header.compose(len);
            let (written, halt) = write_bounded(stream, header, policy).await?;
            tracing::trace!(peer = ?self.peer, header_bytes = written, "Wrote disguised header");
            if halt != Halt::Complete {
                tracing::debug!(peer = ?self.peer, halt = ?halt, "Header write failed");
                return Err(EndpointError::ConnectionBroken);
            }
        }

        let (written, halt) = write_bounded(stream, payload, policy).await?;
        tracing::trace!(peer = ?self.peer, mode = %self.mode, bytes = written, "Payload sent");
        match (halt, written) {
            (Halt::Complete, _) => Ok(written),
            (_, 0) => Err(EndpointError::ConnectionBroken),
            _ => Err(EndpointError::PartialBroken {
                content: from..from + written,
            }),
        }
    }

    /// Dial-side probe: send the 18-byte request line, read 18 bytes back.
    pub async fn handshake(&mut self, policy: &RetryPolicy) -> Result<()> {
        if self.side != Side::Dialed {
            return Err(ConfigurationError::WrongSide("dialing").into());
        }
        let stream = self.stream.as_mut().ok_or(EndpointError::ConnectionBroken)?;

        let (written, halt) = write_bounded(stream, HANDSHAKE_PROBE, policy).await?;
        check_handshake_leg(written, halt)?;

        let mut reply = [0u8; HANDSHAKE_LEN];
        let (read, halt) = read_exact_bounded(stream, &mut reply, policy).await?;
        check_handshake_leg(read, halt)?;

        tracing::debug!(peer = ?self.peer, "Handshake complete");
        Ok(())
    }

    /// Accept-side counterpart of [`handshake`](Self::handshake): read the
    /// probe and echo it back.
    pub async fn answer_handshake(&mut self, policy: &RetryPolicy) -> Result<()> {
        if self.side != Side::Accepted {
            return Err(ConfigurationError::WrongSide("accepting").into());
        }
        let stream = self.stream.as_mut().ok_or(EndpointError::ConnectionBroken)?;

        let mut probe = [0u8; HANDSHAKE_LEN];
        let (read, halt) = read_exact_bounded(stream, &mut probe, policy).await?;
        check_handshake_leg(read, halt)?;
        if &probe != HANDSHAKE_PROBE {
            tracing::debug!(peer = ?self.peer, "Unexpected handshake probe, echoing anyway");
        }

        let (written, halt) = write_bounded(stream, &probe, policy).await?;
        check_handshake_leg(written, halt)?;

        tracing::debug!(peer = ?self.peer, "Handshake answered");
        Ok(())
    }

    /// Shut the connection down and release it. Later calls do nothing.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::trace!(peer = ?self.peer, error = %e, "Shutdown on close failed");
            }
            self.carry.clear();
            tracing::debug!(peer = ?self.peer, mode = %self.mode, "Endpoint closed");
        }
    }
}

impl FramedEndpoint<TcpStream> {
    /// Resolve `target`, connect, and wrap the connection as the dial side.
    ///
    /// Every resolved address is tried in order, each under `connect_timeout`.
    pub async fn connect(target: &DialTarget, mode: Mode, connect_timeout: Duration) -> Result<Self> {
        let header = HeaderWriter::new(&target.preamble())?;

        let addrs: Vec<SocketAddr> = lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(|source| ConfigurationError::Resolve {
                host: target.host.clone(),
                source,
            })?
            .collect();

        let mut last_error = ConfigurationError::NoAddresses {
            host: target.host.clone(),
        };
        for addr in addrs {
            tracing::debug!(host = %target.host, address = %addr, "Connecting");
            match timeout(connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true)?;
                    tracing::info!(host = %target.host, address = %addr, mode = %mode, "Connected to remote");
                    return Ok(Self::from_parts(stream, mode, Side::Dialed, header).with_peer(addr));
                }
                Ok(Err(source)) => {
                    last_error = ConfigurationError::Connect {
                        host: target.host.clone(),
                        port: target.port,
                        source,
                    };
                }
                Err(_) => {
                    last_error = ConfigurationError::ConnectTimeout {
                        host: target.host.clone(),
                        port: target.port,
                    };
                }
            }
        }

        tracing::error!(host = %target.host, port = target.port, error = %last_error, "Cannot connect to remote");
        Err(last_error.into())
    }
}

/// Put the bytes of an unfinished frame back in front of anything already
/// carried, so the next receive sees the stream in order.
fn park(carry: &mut Vec<u8>, partial: &[u8]) {
    carry.splice(0..0, partial.iter().copied());
}

/// Move carried-over bytes to the front of `window`. Returns bytes placed.
fn take_carry(carry: &mut Vec<u8>, window: &mut [u8]) -> usize {
    let n = carry.len().min(window.len());
    window[..n].copy_from_slice(&carry[..n]);
    carry.drain(..n);
    n
}

fn check_handshake_leg(moved: usize, halt: Halt) -> Result<()> {
    match halt {
        Halt::Complete => Ok(()),
        Halt::PeerClosed => Err(ConfigurationError::HandshakeClosed.into()),
        Halt::Stalled => Err(ConfigurationError::HandshakeTimeout {
            transferred: moved,
            expected: HANDSHAKE_LEN,
        }
        .into()),
    }
}

fn peer_gone(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

fn transient(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

/// One read, waiting at most `wait`.
async fn read_attempt<S>(stream: &mut S, dst: &mut [u8], wait: Duration) -> Result<Attempt>
where
    S: AsyncRead + Unpin,
{
    match timeout(wait, stream.read(dst)).await {
        Ok(Ok(0)) => Ok(Attempt::Closed),
        Ok(Ok(n)) => Ok(Attempt::Moved(n)),
        Ok(Err(e)) if peer_gone(&e) => Ok(Attempt::Closed),
        Ok(Err(e)) if transient(&e) => Ok(Attempt::Idle),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Ok(Attempt::Idle),
    }
}

/// Read until `dst` is full, the peer closes, or the budget runs out.
async fn read_exact_bounded<S>(stream: &mut S, dst: &mut [u8], policy: &RetryPolicy) -> Result<(usize, Halt)>
where
    S: AsyncRead + Unpin,
{
    let mut idle = IdleCounter::new(policy);
    let mut read = 0;
    while read < dst.len() {
        match read_attempt(stream, &mut dst[read..], policy.wait).await? {
            Attempt::Moved(n) => {
                read += n;
                idle.reset();
            }
            Attempt::Closed => return Ok((read, Halt::PeerClosed)),
            Attempt::Idle => {
                if !idle.record_idle() {
                    return Ok((read, Halt::Stalled));
                }
            }
        }
    }
    Ok((read, Halt::Complete))
}

/// Write all of `bytes` under the retry policy.
async fn write_bounded<S>(stream: &mut S, bytes: &[u8], policy: &RetryPolicy) -> Result<(usize, Halt)>
where
    S: AsyncWrite + Unpin,
{
    let mut idle = IdleCounter::new(policy);
    let mut written = 0;
    while written < bytes.len() {
        let attempt = match timeout(policy.wait, stream.write(&bytes[written..])).await {
            Ok(Ok(0)) => Attempt::Closed,
            Ok(Ok(n)) => Attempt::Moved(n),
            Ok(Err(e)) if peer_gone(&e) => Attempt::Closed,
            Ok(Err(e)) if transient(&e) => Attempt::Idle,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => Attempt::Idle,
        };
        match attempt {
            Attempt::Moved(n) => {
                written += n;
                idle.reset();
            }
            Attempt::Closed => return Ok((written, Halt::PeerClosed)),
            Attempt::Idle => {
                if !idle.record_idle() {
                    return Ok((written, Halt::Stalled));
                }
            }
        }
    }

    match timeout(policy.budget(), stream.flush()).await {
        Ok(Ok(())) => Ok((written, Halt::Complete)),
        Ok(Err(e)) if peer_gone(&e) => Ok((written, Halt::PeerClosed)),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Ok((written, Halt::Stalled)),
    }
}
