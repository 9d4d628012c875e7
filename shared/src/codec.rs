//! Newline-delimited request codec
//!
//! A connection carries exactly one request:
//! ```text
//! { "command": [...], "credentials": [...] }\n
//! ```
//!
//! Bytes after the first newline are ignored. The line is bounded so a peer
//! cannot make the runner buffer without limit.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::limits::MAX_REQUEST_BYTES;
use crate::Request;

/// Errors that can occur while reading or writing protocol messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid request: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid request: command must name an executable")]
    EmptyCommand,

    #[error("request exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    #[error("connection closed before the request line was terminated")]
    Unterminated,

    #[error("connection closed before any request was sent")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse one request line (trailing newline optional)
pub fn decode_request(line: &[u8]) -> Result<Request, ProtocolError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let request: Request = serde_json::from_slice(line)?;
    request.validate()?;
    Ok(request)
}

/// Encode a request as a single newline-terminated line
pub fn encode_request(request: &Request) -> Result<Bytes, ProtocolError> {
    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

/// Accumulates bytes until the request line is complete
#[derive(Debug)]
pub struct RequestDecoder {
    buffer: BytesMut,
    limit: usize,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestDecoder {
    /// Create a decoder with the default size limit
    pub fn new() -> Self {
        Self::with_limit(MAX_REQUEST_BYTES)
    }

    /// Create a decoder accepting lines of at most `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(limit.min(4096)),
            limit,
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the request line
    ///
    /// Returns `Ok(None)` while no newline has arrived and the buffer is
    /// still within the limit.
    pub fn decode_next(&mut self) -> Result<Option<Request>, ProtocolError> {
        match self.buffer.iter().position(|b| *b == b'\n') {
            Some(pos) if pos + 1 > self.limit => Err(ProtocolError::RequestTooLarge {
                limit: self.limit,
            }),
            Some(pos) => {
                let line = self.buffer.split_to(pos + 1);
                decode_request(&line).map(Some)
            }
            None if self.buffer.len() >= self.limit => Err(ProtocolError::RequestTooLarge {
                limit: self.limit,
            }),
            None => Ok(None),
        }
    }

    /// Called when the peer closed its side without sending a newline
    pub fn finish(&mut self) -> ProtocolError {
        if self.buffer.is_empty() {
            ProtocolError::Closed
        } else {
            ProtocolError::Unterminated
        }
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
