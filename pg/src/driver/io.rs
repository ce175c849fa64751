//! Suspension points: socket reads, writes and flushes under a bounded wait.

use std::future::Future;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};
use tracing::trace;

use super::connection::Connection;
use super::handshake::Handshake;
use super::status::PollingStatus;
use super::stream::PgStream;
use super::{PgError, PgResult};
use crate::protocol::BackendMessage;

/// How long a suspension point may wait.
///
/// With an `interval`, the wait wakes at least that often, so a polling
/// caller observes progress in bounded steps. The `deadline` caps the whole
/// operation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Wait {
    pub interval: Option<Duration>,
    pub deadline: Option<Instant>,
}

impl Wait {
    pub(crate) async fn run<F: Future>(self, what: &'static str, fut: F) -> PgResult<F::Output> {
        let mut fut = std::pin::pin!(fut);
        loop {
            let now = Instant::now();
            if self.deadline.is_some_and(|deadline| now >= deadline) {
                return Err(PgError::Timeout(what));
            }
            let until = match (self.interval, self.deadline) {
                (Some(interval), Some(deadline)) => Some((now + interval).min(deadline)),
                (Some(interval), None) => Some(now + interval),
                (None, deadline) => deadline,
            };
            let Some(until) = until else {
                return Ok(fut.await);
            };
            match timeout_at(until, &mut fut).await {
                Ok(out) => return Ok(out),
                Err(_) => trace!(what, "still waiting"),
            }
        }
    }
}

/// Drive `hs` over `stream` until it succeeds or fails.
pub(crate) async fn drive_handshake(
    stream: &mut PgStream,
    hs: &mut Handshake,
    wait: Wait,
) -> PgResult<()> {
    loop {
        match hs.poll() {
            PollingStatus::Ok => return Ok(()),
            PollingStatus::Failed => {
                return Err(hs.take_error().unwrap_or_else(|| {
                    PgError::Connection("Connection handshake failed".to_string())
                }));
            }
            PollingStatus::Active => {}
            PollingStatus::Writing => {
                let n = wait
                    .run("sending startup", stream.write(hs.pending_output()))
                    .await?
                    .map_err(|e| PgError::Connection(format!("Failed to send startup: {}", e)))?;
                if n == 0 {
                    return Err(PgError::Connection("Server closed the connection".to_string()));
                }
                hs.consume_output(n);
                if hs.pending_output().is_empty() {
                    wait.run("sending startup", stream.flush())
                        .await?
                        .map_err(|e| PgError::Flush(e.to_string()))?;
                }
            }
            PollingStatus::Reading => {
                let n = wait
                    .run("awaiting startup response", stream.read_buf(hs.inbound_mut()))
                    .await??;
                if n == 0 {
                    return Err(PgError::Connection(
                        "Server closed the connection during startup".to_string(),
                    ));
                }
            }
        }
    }
}

/// Write and flush `buf` in full, consuming it.
///
/// `Ok(false)` means the deadline passed before a single byte left, so the
/// connection is still in protocol sync.
pub(crate) async fn flush_outbound(
    stream: &mut PgStream,
    buf: &mut BytesMut,
    wait: Wait,
) -> PgResult<bool> {
    let mut written = 0usize;
    while !buf.is_empty() {
        let n = match wait.run("sending query", stream.write(buf)).await {
            Ok(result) => result.map_err(|e| PgError::Send(e.to_string()))?,
            Err(PgError::Timeout(_)) if written == 0 => {
                buf.clear();
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if n == 0 {
            return Err(PgError::Send("Socket accepted no data".to_string()));
        }
        written += n;
        let _ = buf.split_to(n);
    }
    wait.run("flushing query", stream.flush())
        .await?
        .map_err(|e| PgError::Flush(e.to_string()))?;
    Ok(true)
}

impl Connection {
    /// Receive one backend message, reading from the socket as needed.
    pub(crate) async fn recv(&mut self, wait: Wait) -> PgResult<BackendMessage> {
        loop {
            if let Some(msg) = BackendMessage::parse(&mut self.read_buf).map_err(PgError::Protocol)? {
                return Ok(msg);
            }
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| PgError::Broken("Connection is closed".to_string()))?;
            let n = wait
                .run("awaiting results", stream.read_buf(&mut self.read_buf))
                .await??;
            if n == 0 {
                return Err(PgError::Broken("Server closed the connection".to_string()));
            }
        }
    }
}
