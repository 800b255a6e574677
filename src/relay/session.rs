//! One relayed connection pair.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{EndpointError, ParseError};
use crate::framing::TransferBuffer;
use crate::lifecycle::ShutdownSignal;
use crate::net::FramedEndpoint;
use crate::observability::metrics;
use crate::relay::{Direction, SessionId};
use crate::resilience::RetryPolicy;

/// Byte and message counts for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub frames_up: u64,
    pub frames_down: u64,
}

impl SessionStats {
    fn record(&mut self, direction: Direction, bytes: usize) {
        match direction {
            Direction::Upstream => {
                self.bytes_up += bytes as u64;
                self.frames_up += 1;
            }
            Direction::Downstream => {
                self.bytes_down += bytes as u64;
                self.frames_down += 1;
            }
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// One of the peers went away.
    Closed,
    /// A disguised header could not be parsed; the message was dropped.
    Malformed(ParseError),
    /// The process is shutting down.
    Shutdown,
    /// Any other endpoint failure.
    Failed(String),
}

impl From<EndpointError> for SessionEnd {
    fn from(err: EndpointError) -> Self {
        match err {
            EndpointError::ConnectionBroken | EndpointError::PartialBroken { .. } => SessionEnd::Closed,
            EndpointError::Parse(e) => {
                metrics::record_parse_failure();
                SessionEnd::Malformed(e)
            }
            other => SessionEnd::Failed(other.to_string()),
        }
    }
}

/// Owns both endpoints of a relayed connection and one transfer buffer.
pub struct Session<L, R> {
    id: SessionId,
    local: FramedEndpoint<L>,
    remote: FramedEndpoint<R>,
    buffer: TransferBuffer,
    receive: RetryPolicy,
    send: RetryPolicy,
}

impl<L, R> Session<L, R>
where
    L: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        id: SessionId,
        local: FramedEndpoint<L>,
        remote: FramedEndpoint<R>,
        buffer_size: usize,
        receive: RetryPolicy,
        send: RetryPolicy,
    ) -> Self {
        Self {
            id,
            local,
            remote,
            buffer: TransferBuffer::new(buffer_size),
            receive,
            send,
        }
    }

    /// Relay until a side breaks or `shutdown` fires, then close both ends.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> (SessionEnd, SessionStats) {
        tracing::info!(
            session_id = %self.id,
            local_mode = %self.local.mode(),
            remote_mode = %self.remote.mode(),
            "Session started"
        );

        let mut stats = SessionStats::default();
        let end = tokio::select! {
            err = self.pump(&mut stats) => SessionEnd::from(err),
            _ = shutdown.fired() => SessionEnd::Shutdown,
        };

        self.local.close().await;
        self.remote.close().await;

        match &end {
            SessionEnd::Malformed(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Dropping malformed message and closing session");
            }
            SessionEnd::Failed(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Session failed");
            }
            SessionEnd::Closed | SessionEnd::Shutdown => {}
        }
        tracing::info!(
            session_id = %self.id,
            end = ?end,
            bytes_up = stats.bytes_up,
            bytes_down = stats.bytes_down,
            frames_up = stats.frames_up,
            frames_down = stats.frames_down,
            "Session ended"
        );
        (end, stats)
    }

    /// Alternate directions until one of them fails.
    async fn pump(&mut self, stats: &mut SessionStats) -> EndpointError {
        loop {
            if let Err(e) = forward(
                &mut self.local,
                &mut self.remote,
                &mut self.buffer,
                &self.receive,
                &self.send,
                Direction::Upstream,
                stats,
            )
            .await
            {
                return e;
            }
            if let Err(e) = forward(
                &mut self.remote,
                &mut self.local,
                &mut self.buffer,
                &self.receive,
                &self.send,
                Direction::Downstream,
                stats,
            )
            .await
            {
                return e;
            }
        }
    }
}

/// Move at most one message from `from` to `to`.
async fn forward<F, T>(
    from: &mut FramedEndpoint<F>,
    to: &mut FramedEndpoint<T>,
    buffer: &mut TransferBuffer,
    receive: &RetryPolicy,
    send: &RetryPolicy,
    direction: Direction,
    stats: &mut SessionStats,
) -> Result<(), EndpointError>
where
    F: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let received = match from.receive(buffer, 0, receive).await {
        Ok(Some(received)) => received,
        Ok(None) => return Ok(()),
        Err(EndpointError::PartialBroken { content }) => {
            // Deliver the tail the peer managed to send before leaving.
            let sent = to.send(buffer, content.start, content.len(), send).await?;
            stats.record(direction, sent);
            metrics::record_relayed(direction, sent);
            return Err(EndpointError::ConnectionBroken);
        }
        Err(e) => return Err(e),
    };

    let sent = to.send(buffer, received.start(), received.len(), send).await?;
    stats.record(direction, sent);
    metrics::record_relayed(direction, sent);
    tracing::trace!(direction = %direction, bytes = sent, "Relayed message");
    Ok(())
}
