//! Stream multiplexer
//!
//! Copies a child's output pipe to the local console and to the client
//! connection. stdout and stderr share the one connection with no framing;
//! only the console keeps them apart.

use bytes::BytesMut;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const CHUNK_SIZE: usize = 8 * 1024;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct WriterState {
    writer: BoxedWriter,
    /// Set after the first failed write; later writes are dropped
    broken: bool,
    /// Whether the last byte written was a newline (or nothing written yet)
    at_line_start: bool,
}

/// Shared write side of a client connection
#[derive(Clone)]
pub struct SessionWriter {
    inner: Arc<Mutex<WriterState>>,
}

impl SessionWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(WriterState {
                writer: Box::new(writer),
                broken: false,
                at_line_start: true,
            })),
        }
    }

    /// Write a chunk to the client
    ///
    /// Only the first failure is returned. Once the peer is gone, further
    /// writes are discarded so the child's pipes can still be drained.
    pub async fn write(&self, data: &[u8]) -> io::Result<()> {
        let mut state = self.inner.lock().await;
        if state.broken || data.is_empty() {
            return Ok(());
        }

        let result = async {
            state.writer.write_all(data).await?;
            state.writer.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                state.at_line_start = data.ends_with(b"\n");
                Ok(())
            }
            Err(e) => {
                state.broken = true;
                Err(e)
            }
        }
    }

    /// Write `line` so that it starts on a fresh line
    pub async fn write_line_start(&self, line: &[u8]) -> io::Result<()> {
        let needs_newline = !self.inner.lock().await.at_line_start;
        if needs_newline {
            self.write(b"\n").await?;
        }
        self.write(line).await
    }

    /// Whether a write to the client has failed
    pub async fn is_broken(&self) -> bool {
        self.inner.lock().await.broken
    }

    /// Close the write side so the client sees end-of-stream
    pub async fn shutdown(&self) -> io::Result<()> {
        let mut state = self.inner.lock().await;
        state.writer.shutdown().await
    }
}

/// Local console stream a pipe is mirrored to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleSink {
    Stdout,
    Stderr,
}

impl ConsoleSink {
    fn name(&self) -> &'static str {
        match self {
            ConsoleSink::Stdout => "stdout",
            ConsoleSink::Stderr => "stderr",
        }
    }

    async fn write(&self, data: &[u8]) -> io::Result<()> {
        match self {
            ConsoleSink::Stdout => {
                let mut out = tokio::io::stdout();
                out.write_all(data).await?;
                out.flush().await
            }
            ConsoleSink::Stderr => {
                let mut err = tokio::io::stderr();
                err.write_all(data).await?;
                err.flush().await
            }
        }
    }
}

/// Copy `source` to `console` and `remote` until end-of-stream
///
/// Returns the number of bytes read from `source`.
pub async fn pump<R>(mut source: R, console: ConsoleSink, remote: SessionWriter) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
    let mut total = 0u64;

    loop {
        buf.reserve(CHUNK_SIZE);
        let n = source.read_buf(&mut buf).await?;
        if n == 0 {
            break;
        }
        total += n as u64;
        let chunk = buf.split().freeze();

        if let Err(e) = console.write(&chunk).await {
            debug!("Console {} write failed: {}", console.name(), e);
        }
        if let Err(e) = remote.write(&chunk).await {
            warn!(
                "Client stopped receiving {} ({}); still draining the pipe",
                console.name(),
                e
            );
        }
    }

    debug!("{} drained after {} bytes", console.name(), total);
    Ok(total)
}
