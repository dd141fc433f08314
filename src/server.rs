//! Quote Connection Server
//!
//! Accepts TCP connections and runs one handler task per client. The
//! transport is a byte stream, so requests are framed as newline-delimited
//! JSON: a per-connection buffered reader reassembles split or coalesced
//! segments into exactly one dispatch per line.

use std::io;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::model::ModelRegistry;
use crate::protocol::Dispatcher;

/// Hard cap on one framed request line. Mirrors the 16 KiB receive buffer
/// of the upstream feed handlers; a client exceeding it is disconnected
/// rather than buffered without bound.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024;

/// Configuration for the quote server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on. Port 0 binds an ephemeral port.
    pub bind_addr: SocketAddr,
    /// Maximum size of one framed request line, in bytes.
    pub max_frame_bytes: usize,
    /// USD notional applied when a request omits `order_sz`.
    pub default_order_sz: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".parse().unwrap(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            default_order_sz: crate::protocol::DEFAULT_ORDER_SZ_USD,
        }
    }
}

/// Per-server counters, shared across connection tasks.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_opened: AtomicU64,
    pub connections_closed: AtomicU64,
    pub requests_dispatched: AtomicU64,
    pub oversized_frames: AtomicU64,
    pub io_errors: AtomicU64,
}

impl ServerStats {
    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            requests_dispatched: self.requests_dispatched.load(Ordering::Relaxed),
            oversized_frames: self.oversized_frames.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ServerStatsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub requests_dispatched: u64,
    pub oversized_frames: u64,
    pub io_errors: u64,
}

/// The TCP quote server. Owns the bound listener; connection tasks share
/// only the dispatcher (read-only registry inside) and the counters.
pub struct QuoteServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<ServerStats>,
    max_frame_bytes: usize,
}

impl QuoteServer {
    /// Bind the listener. Separated from [`run`](Self::run) so callers can
    /// learn the bound address before serving (ephemeral test ports).
    pub async fn bind(config: ServerConfig, registry: Arc<ModelRegistry>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let dispatcher =
            Arc::new(Dispatcher::new(registry).with_default_order_sz(config.default_order_sz));
        Ok(Self {
            listener,
            dispatcher,
            stats: Arc::new(ServerStats::default()),
            max_frame_bytes: config.max_frame_bytes,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Accept loop. Runs until the process shuts down; one failed accept
    /// is logged and skipped, it never ends the loop.
    pub async fn run(self) -> io::Result<()> {
        info!(addr = %self.listener.local_addr()?, "📡 quote server listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    continue;
                }
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            let stats = Arc::clone(&self.stats);
            let max_frame_bytes = self.max_frame_bytes;
            tokio::spawn(async move {
                handle_connection(stream, peer, dispatcher, stats, max_frame_bytes).await;
            });
        }
    }
}

/// One connection's read-dispatch-write loop.
///
/// Within a connection requests are handled strictly in arrival order and
/// the response is written and flushed before the next read. A failure
/// here terminates this connection only.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<ServerStats>,
    max_frame_bytes: usize,
) {
    stats.connections_opened.fetch_add(1, Ordering::Relaxed);
    debug!(%peer, "client connected");

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut frame = Vec::with_capacity(1024);

    loop {
        match read_frame(&mut reader, &mut frame, max_frame_bytes).await {
            Ok(Some(())) => {
                let line = String::from_utf8_lossy(&frame);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let response = dispatcher.dispatch(line);
                stats.requests_dispatched.fetch_add(1, Ordering::Relaxed);

                if let Err(err) = write_response(&mut write_half, &response).await {
                    stats.io_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(%peer, error = %err, "write failed, dropping connection");
                    break;
                }
            }
            // Zero-byte read: the peer closed its side. Normal shutdown.
            Ok(None) => {
                debug!(%peer, "connection closed by client");
                break;
            }
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                stats.oversized_frames.fetch_add(1, Ordering::Relaxed);
                warn!(%peer, error = %err, "dropping connection");
                break;
            }
            Err(err) => {
                stats.io_errors.fetch_add(1, Ordering::Relaxed);
                warn!(%peer, error = %err, "read failed, dropping connection");
                break;
            }
        }
    }

    stats.connections_closed.fetch_add(1, Ordering::Relaxed);
    debug!(%peer, "connection finished");
}

/// Read one newline-terminated frame into `frame` (delimiter excluded).
///
/// Returns `Ok(None)` on clean EOF with nothing buffered. Unterminated
/// trailing bytes at EOF are handed over as a final frame, matching
/// `read_line` semantics. A frame longer than `max_bytes` fails with
/// `InvalidData` before any further buffering.
async fn read_frame<R>(
    reader: &mut BufReader<R>,
    frame: &mut Vec<u8>,
    max_bytes: usize,
) -> io::Result<Option<()>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    frame.clear();

    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            if frame.is_empty() {
                return Ok(None);
            }
            return Ok(Some(()));
        }

        match chunk.iter().position(|&byte| byte == b'\n') {
            Some(newline) => {
                frame.extend_from_slice(&chunk[..newline]);
                reader.consume(newline + 1);
                if frame.len() > max_bytes {
                    return Err(oversized(frame.len(), max_bytes));
                }
                return Ok(Some(()));
            }
            None => {
                frame.extend_from_slice(chunk);
                let consumed = chunk.len();
                reader.consume(consumed);
                if frame.len() > max_bytes {
                    return Err(oversized(frame.len(), max_bytes));
                }
            }
        }
    }
}

fn oversized(got: usize, max: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("frame of {} bytes exceeds the {} byte cap", got, max),
    )
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &str) -> io::Result<()> {
    writer.write_all(response.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
