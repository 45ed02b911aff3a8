//! Per-connection request handling
//!
//! Each accepted connection gets exactly one request/response cycle:
//! read one line, answer it (or not), close. Every failure stays inside the
//! connection that caused it.

use crate::error::QueryError;
use crate::host::HostState;
use log::{debug, info, warn};
use shared::{encode_json, encode_plain, encode_ranks, Request};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

/// Runtime debug switch shared by the service and all live handlers.
#[derive(Debug, Clone)]
pub struct DebugFlag(Arc<AtomicBool>);

impl DebugFlag {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    /// Flips the flag and returns the new value
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::Relaxed)
    }
}

/// Limits applied while reading a request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerSettings {
    pub max_line_length: usize,
    pub read_timeout: Option<Duration>,
}

/// How a connection ended when no I/O error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A response of `bytes` bytes was written.
    Responded { request: Request, bytes: usize },
    /// A full line arrived but matched no command. Includes empty lines.
    Ignored(String),
    /// The stream ended before a newline.
    Incomplete,
    /// No newline within the line length limit.
    Oversized,
}

enum RequestLine {
    Line(String),
    Incomplete,
    Oversized,
}

/// Task body for one accepted connection. Never returns an error; failures
/// are logged and the connection is dropped.
pub async fn handle_connection<S, H>(
    stream: S,
    peer: SocketAddr,
    host: Arc<H>,
    settings: HandlerSettings,
    debug: DebugFlag,
) where
    S: AsyncRead + AsyncWrite + Unpin,
    H: HostState + ?Sized,
{
    match serve(stream, host.as_ref(), &settings, &debug).await {
        Ok(Outcome::Responded { request, bytes }) => {
            debug!("Answered {} from {} with {} bytes", request, peer, bytes);
        }
        Ok(Outcome::Ignored(line)) => {
            debug!("No response for request {:?} from {}", line, peer);
        }
        Ok(Outcome::Incomplete) => {
            debug!("{} closed the connection before sending a request", peer);
        }
        Ok(Outcome::Oversized) => {
            debug!(
                "Dropped request from {}: no newline within {} bytes",
                peer, settings.max_line_length
            );
        }
        Err(e) => {
            if debug.is_enabled() {
                warn!("There was an error while handling a request from {}: {}", peer, e);
            } else {
                debug!("Request from {} failed: {}", peer, e);
            }
        }
    }
}

/// Reads one request line from `stream`, writes the response and closes.
///
/// The stream is consumed, so it is closed on every return path.
pub async fn serve<S, H>(
    stream: S,
    host: &H,
    settings: &HandlerSettings,
    debug: &DebugFlag,
) -> Result<Outcome, QueryError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: HostState + ?Sized,
{
    let mut stream = BufReader::new(stream);

    let read = read_request_line(&mut stream, settings.max_line_length);
    let line = match settings.read_timeout {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .map_err(|_| QueryError::ReadTimeout(limit))??,
        None => read.await?,
    };

    let line = match line {
        RequestLine::Line(line) => line,
        RequestLine::Incomplete => return Ok(Outcome::Incomplete),
        RequestLine::Oversized => return Ok(Outcome::Oversized),
    };

    if debug.is_enabled() {
        info!("Request received: {}", line);
    }

    let Some(request) = Request::parse(&line) else {
        return Ok(Outcome::Ignored(line));
    };

    let response = respond(&request, host)?;
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;

    Ok(Outcome::Responded {
        request,
        bytes: response.len(),
    })
}

/// Encodes the response for `request` from a fresh read of `host`.
pub fn respond<H>(request: &Request, host: &H) -> Result<String, QueryError>
where
    H: HostState + ?Sized,
{
    let response = match request {
        Request::Query => encode_plain(&host.snapshot()),
        Request::QueryJson => encode_json(&host.snapshot())?,
        Request::QueryRanks { player } => encode_ranks(&host.permissions(player))?,
    };
    Ok(response)
}

/// Reads up to `max_line_length` bytes looking for a newline, so a hostile
/// client can never make us buffer more than that.
async fn read_request_line<R>(reader: &mut R, max_line_length: usize) -> std::io::Result<RequestLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(64);
    let read = reader
        .take(max_line_length as u64)
        .read_until(b'\n', &mut buf)
        .await?;

    if buf.last() != Some(&b'\n') {
        return Ok(if read >= max_line_length {
            RequestLine::Oversized
        } else {
            RequestLine::Incomplete
        });
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    Ok(RequestLine::Line(String::from_utf8_lossy(&buf).into_owned()))
}
