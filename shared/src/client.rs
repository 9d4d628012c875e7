//! Minimal client for submitting a request to a runner
//!
//! Writes the request line, then reads until the runner closes the
//! connection and classifies the result by the status trailer.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{encode_request, ProtocolError};
use crate::status::parse_status;
use crate::{Request, TerminalState};

/// Everything the runner sent back on one connection
#[derive(Debug, Clone)]
pub struct Response {
    bytes: Vec<u8>,
    status: Option<TerminalState>,
}

impl Response {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let status = parse_status(&bytes);
        Self { bytes, status }
    }

    /// Terminal state, if the response ended with a status line
    pub fn status(&self) -> Option<TerminalState> {
        self.status
    }

    pub fn succeeded(&self) -> bool {
        self.status == Some(TerminalState::Success)
    }

    /// Raw response bytes, trailer included
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Response as lossy UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Error description preceding a FAILED status line
    pub fn error_line(&self) -> Option<String> {
        if self.status != Some(TerminalState::Failed) {
            return None;
        }
        let text = self.text();
        let mut lines = text.lines().rev();
        lines.next();
        lines.next().map(str::to_string)
    }
}

/// Send `request` over `stream` and read the complete response
pub async fn submit<S>(stream: &mut S, request: &Request) -> Result<Response, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = encode_request(request)?;
    stream.write_all(&line).await?;
    stream.flush().await?;

    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).await?;
    Ok(Response::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;

    #[test]
    fn test_response_classification() {
        let ok = Response::from_bytes(b"hello\nstatus: SUCCESS\n".to_vec());
        assert!(ok.succeeded());
        assert!(ok.error_line().is_none());

        let failed = Response::from_bytes(b"out\nexit status: 1\nstatus: FAILED\n".to_vec());
        assert_eq!(failed.status(), Some(TerminalState::Failed));
        assert_eq!(failed.error_line().as_deref(), Some("exit status: 1"));

        let truncated = Response::from_bytes(b"partial output".to_vec());
        assert!(truncated.status().is_none());
    }

    #[tokio::test]
    async fn test_submit_over_duplex() {
        let (mut client, server) = tokio::io::duplex(1024);

        let runner = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut line = String::new();
            tokio::io::BufReader::new(read).read_line(&mut line).await.unwrap();
            assert!(line.ends_with('\n'));
            write.write_all(b"hi\nstatus: SUCCESS\n").await.unwrap();
            write.shutdown().await.unwrap();
        });

        let response = submit(&mut client, &Request::new(["echo", "hi"]))
            .await
            .unwrap();
        runner.await.unwrap();

        assert!(response.succeeded());
        assert_eq!(response.bytes(), b"hi\nstatus: SUCCESS\n");
    }
}
