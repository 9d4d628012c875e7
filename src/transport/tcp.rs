//! TCP listener implementation

use crate::transport::traits::{TransportListener, TransportStream};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

impl TransportStream for TcpStream {}

/// Listener bound to a `host:port`
pub struct TcpTransportListener {
    inner: TcpListener,
}

impl TcpTransportListener {
    /// Bind to `host:port`; the host may be a name such as `localhost`
    pub async fn bind(host: &str) -> io::Result<Self> {
        let inner = TcpListener::bind(host).await?;
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

#[async_trait]
impl TransportListener for TcpTransportListener {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(Self::Stream, String)> {
        let (stream, addr) = self.inner.accept().await?;
        Ok((stream, addr.to_string()))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }

    fn local_description(&self) -> String {
        match self.local_addr() {
            Ok(addr) => format!("tcp://{}", addr),
            Err(_) => "tcp://<unbound>".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_tcp_accept_and_close() {
        let listener = TcpTransportListener::bind("127.0.0.1:0").await.unwrap();
        assert_eq!(listener.name(), "tcp");
        let addr = listener.local_addr().unwrap();
        assert!(listener.local_description().starts_with("tcp://127.0.0.1:"));

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let (mut stream, peer) = listener.accept().await.unwrap();
        assert!(peer.starts_with("127.0.0.1:"));
        stream.write_all(b"ping").await.unwrap();
        stream.shutdown().await.unwrap();

        assert_eq!(client.await.unwrap(), b"ping");
    }
}
