//! Runner configuration

use crate::credentials::default_auth_file;
use build_runner_shared::limits;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Settings for one runner process
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Listen address, `tcp://host:port` or `unix://path`
    pub address: String,
    /// Keep serving after the first request instead of exiting
    pub multiple: bool,
    /// Credential store location; `None` selects the executable-relative default
    pub auth_file: Option<PathBuf>,
    /// Deadline for each command; `None` waits indefinitely
    pub command_timeout: Option<Duration>,
    /// Largest accepted request line, newline included
    pub max_request_bytes: usize,
    /// Pause before a single-shot runner exits
    pub grace_period: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            address: limits::DEFAULT_ADDRESS.into(),
            multiple: false,
            auth_file: None,
            command_timeout: None,
            max_request_bytes: limits::MAX_REQUEST_BYTES,
            grace_period: Duration::from_millis(limits::SINGLE_SHOT_GRACE_MS),
        }
    }
}

impl RunnerConfig {
    /// Credential store path to use
    pub fn resolve_auth_file(&self) -> io::Result<PathBuf> {
        match &self.auth_file {
            Some(path) => Ok(path.clone()),
            None => default_auth_file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.address, "tcp://localhost:8080");
        assert!(!config.multiple);
        assert!(config.command_timeout.is_none());
        assert_eq!(config.grace_period, Duration::from_secs(2));
        assert_eq!(config.max_request_bytes, 1024 * 1024);
    }

    #[test]
    fn test_explicit_auth_file_wins() {
        let config = RunnerConfig {
            auth_file: Some(PathBuf::from("/var/run/runner/auth.json")),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_auth_file().unwrap(),
            PathBuf::from("/var/run/runner/auth.json")
        );
    }
}
