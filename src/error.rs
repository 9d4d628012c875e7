//! Error taxonomy
//!
//! `TransportError` is fatal at startup. Everything else is scoped to one
//! connection: it is reported to the peer as an error line plus the FAILED
//! trailer and never reaches the listener loop.

use build_runner_shared::codec::ProtocolError;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid listen address {0:?}: expected scheme://host[:port][/path]")]
    InvalidAddress(String),

    #[error("unsupported address scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credential store {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("credential store {} is malformed: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode credential store {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write credential store {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("credentials for {registry}: auth and username are mutually exclusive")]
    ConflictingAuth { registry: String },

    #[error("credentials for {registry}: either auth or username is required")]
    MissingSecret { registry: String },

    #[error("credential entry is missing its registry")]
    EmptyRegistry,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no command to execute")]
    EmptyCommand,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed: {status}")]
    NonZeroExit { program: String, status: ExitStatus },

    #[error("command timed out after {timeout:?}")]
    TimedOut { timeout: Duration },
}

/// Any failure confined to a single connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Request(#[from] ProtocolError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
