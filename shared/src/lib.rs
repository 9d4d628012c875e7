//! Build Runner Shared Protocol Types
//!
//! This crate provides the wire types and codec shared between the build
//! runner and the engines that submit build requests to it.

pub mod client;
pub mod codec;
pub mod state_machine;
pub mod status;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol parameters
pub mod limits {
    /// Default upper bound for a single request line, newline included
    pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

    /// Delay before a single-shot runner exits, so the peer can finish reading
    pub const SINGLE_SHOT_GRACE_MS: u64 = 2000;

    /// Default listen address
    pub const DEFAULT_ADDRESS: &str = "tcp://localhost:8080";
}

/// A build request: one per connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Executable followed by its arguments
    pub command: Vec<String>,
    /// Registry credentials to install before the command runs
    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,
}

impl Request {
    /// Create a request with no credentials
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            credentials: Vec::new(),
        }
    }

    /// Attach a credential entry
    pub fn with_credential(mut self, entry: CredentialEntry) -> Self {
        self.credentials.push(entry);
        self
    }

    /// Check structural validity (the command must name an executable)
    pub fn validate(&self) -> Result<(), codec::ProtocolError> {
        match self.command.first() {
            Some(program) if !program.is_empty() => Ok(()),
            _ => Err(codec::ProtocolError::EmptyCommand),
        }
    }

    /// Registries named by this request, for logging
    pub fn registries(&self) -> Vec<&str> {
        self.credentials.iter().map(|c| c.registry.as_str()).collect()
    }
}

/// Authentication material for a single registry
///
/// Carries either a pre-encoded `auth` value or a `username`/`password`
/// pair. Supplying both is rejected by the runner.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub registry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub insecure: bool,
}

impl CredentialEntry {
    /// Entry built from a username and password
    pub fn basic(
        registry: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            username: Some(username.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    /// Entry built from an already encoded auth value
    pub fn encoded(registry: impl Into<String>, auth: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            auth: Some(auth.into()),
            ..Default::default()
        }
    }
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "<redacted>";
        f.debug_struct("CredentialEntry")
            .field("registry", &self.registry)
            .field("auth", &self.auth.as_ref().map(|_| REDACTED))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("insecure", &self.insecure)
            .finish()
    }
}

/// Terminal state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Success,
    Failed,
}

/// Outcome reported at the end of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub state: TerminalState,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success() -> Self {
        Self {
            state: TerminalState::Success,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: TerminalState::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == TerminalState::Success
    }
}
