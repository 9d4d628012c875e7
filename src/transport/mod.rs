//! Transport layer: turns a configured address into a listener
//!
//! This module handles:
//! - Parsing `tcp://` and `unix://` listen addresses
//! - Binding the matching listener
//! - Handing accepted connections out as boxed transport streams

mod address;
mod tcp;
mod traits;
#[cfg(unix)]
mod unix;

pub use address::ListenAddress;
pub use tcp::TcpTransportListener;
pub use traits::{TransportListener, TransportStream};
#[cfg(unix)]
pub use unix::UnixTransportListener;

use crate::error::TransportError;
use std::io;
use tracing::info;

/// A connection accepted by a [`Listener`]
pub struct Accepted {
    pub stream: Box<dyn TransportStream>,
    pub peer: String,
}

/// Listener for whichever transport the address selected
pub enum Listener {
    Tcp(TcpTransportListener),
    #[cfg(unix)]
    Unix(UnixTransportListener),
}

impl Listener {
    /// Bind the listener described by `address`
    pub async fn bind(address: &ListenAddress) -> Result<Self, TransportError> {
        let listener = match address {
            ListenAddress::Tcp(host) => TcpTransportListener::bind(host).await.map(Listener::Tcp),
            #[cfg(unix)]
            ListenAddress::Unix(path) => UnixTransportListener::bind(path).map(Listener::Unix),
            #[cfg(not(unix))]
            ListenAddress::Unix(_) => {
                return Err(TransportError::UnsupportedScheme("unix".into()));
            }
        };

        let listener = listener.map_err(|source| TransportError::Bind {
            address: address.to_string(),
            source,
        })?;
        info!("Listening on {}", listener.local_description());
        Ok(listener)
    }

    /// Parse `address` and bind it
    pub async fn bind_str(address: &str) -> Result<Self, TransportError> {
        let address: ListenAddress = address.parse()?;
        Self::bind(&address).await
    }

    /// Wait for the next connection
    pub async fn accept(&self) -> io::Result<Accepted> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok(Accepted {
                    stream: Box::new(stream),
                    peer,
                })
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok(Accepted {
                    stream: Box::new(stream),
                    peer,
                })
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Listener::Tcp(listener) => listener.name(),
            #[cfg(unix)]
            Listener::Unix(listener) => listener.name(),
        }
    }

    /// Bound address, with the real port when `:0` was requested
    pub fn local_description(&self) -> String {
        match self {
            Listener::Tcp(listener) => listener.local_description(),
            #[cfg(unix)]
            Listener::Unix(listener) => listener.local_description(),
        }
    }
}
