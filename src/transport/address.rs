//! Listen address parsing
//!
//! Addresses take the form `scheme://host[:port][/path]`:
//! - `tcp://localhost:8080` binds a TCP listener on `localhost:8080`
//! - `unix:///tmp/runner.sock` binds a socket at `/tmp/runner.sock`
//! - `unix://run/runner.sock` binds at the relative path `run/runner.sock`

use crate::error::TransportError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    /// `host:port`
    Tcp(String),
    /// Socket path (host and path joined)
    Unix(PathBuf),
}

impl FromStr for ListenAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| TransportError::InvalidAddress(s.to_string()))?;

        match scheme {
            "tcp" => {
                let host = rest.split('/').next().unwrap_or_default();
                if host.is_empty() {
                    return Err(TransportError::InvalidAddress(s.to_string()));
                }
                Ok(ListenAddress::Tcp(host.to_string()))
            }
            "unix" => {
                if rest.is_empty() {
                    return Err(TransportError::InvalidAddress(s.to_string()));
                }
                Ok(ListenAddress::Unix(PathBuf::from(rest)))
            }
            other => Err(TransportError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddress::Tcp(host) => write!(f, "tcp://{}", host),
            ListenAddress::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp() {
        let addr: ListenAddress = "tcp://localhost:8080".parse().unwrap();
        assert_eq!(addr, ListenAddress::Tcp("localhost:8080".into()));
        assert_eq!(addr.to_string(), "tcp://localhost:8080");

        // Any path component is ignored for TCP
        let addr: ListenAddress = "tcp://0.0.0.0:9000/ignored".parse().unwrap();
        assert_eq!(addr, ListenAddress::Tcp("0.0.0.0:9000".into()));
    }

    #[test]
    fn test_parse_unix_absolute_and_relative() {
        let addr: ListenAddress = "unix:///tmp/runner.sock".parse().unwrap();
        assert_eq!(addr, ListenAddress::Unix(PathBuf::from("/tmp/runner.sock")));

        let addr: ListenAddress = "unix://run/runner.sock".parse().unwrap();
        assert_eq!(addr, ListenAddress::Unix(PathBuf::from("run/runner.sock")));
    }

    #[test]
    fn test_unsupported_scheme() {
        let result = "udp://localhost:8080".parse::<ListenAddress>();
        assert!(matches!(result, Err(TransportError::UnsupportedScheme(s)) if s == "udp"));

        let result = "http://localhost".parse::<ListenAddress>();
        assert!(matches!(result, Err(TransportError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_invalid_addresses() {
        for input in ["localhost:8080", "tcp://", "unix://", ""] {
            assert!(
                matches!(
                    input.parse::<ListenAddress>(),
                    Err(TransportError::InvalidAddress(_))
                ),
                "{input}"
            );
        }
    }
}
