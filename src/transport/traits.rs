//! Transport trait abstraction for pluggable listener backends

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// An accepted connection that can read and write bytes
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Source of incoming connections
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// The stream type this listener produces
    type Stream: TransportStream;

    /// Wait for the next connection, returning it with a peer description
    async fn accept(&self) -> io::Result<(Self::Stream, String)>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;

    /// Where the listener is bound, in address form
    fn local_description(&self) -> String;
}
