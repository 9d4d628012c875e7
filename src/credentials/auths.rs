//! Auth file document and merge rules

use crate::error::CredentialError;
use base64::Engine;
use build_runner_shared::CredentialEntry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Contents of the auth file
///
/// Keys other than `auths` (e.g. `credsStore`) are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub auths: BTreeMap<String, AuthEntry>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Authentication for one registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthEntry {
    /// Base64 encoded "username:password"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl AuthEntry {
    fn encoded(auth: String) -> Self {
        Self {
            auth: Some(auth),
            other: Map::new(),
        }
    }
}

/// Encode a username/password pair the way registry clients expect
pub fn encode_basic_auth(username: &str, password: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password))
}

/// Resolve the value to store for one entry, or reject the entry
///
/// A field counts as supplied whenever it is present, even as an empty
/// string, so `"auth": ""` next to a username is still a conflict.
fn resolve(entry: &CredentialEntry) -> Result<String, CredentialError> {
    if entry.registry.is_empty() {
        return Err(CredentialError::EmptyRegistry);
    }

    match (&entry.auth, &entry.username) {
        (Some(_), Some(_)) => Err(CredentialError::ConflictingAuth {
            registry: entry.registry.clone(),
        }),
        (Some(auth), None) if !auth.is_empty() => Ok(auth.clone()),
        (None, Some(username)) if !username.is_empty() => Ok(encode_basic_auth(
            username,
            entry.password.as_deref().unwrap_or_default(),
        )),
        _ => Err(CredentialError::MissingSecret {
            registry: entry.registry.clone(),
        }),
    }
}

impl AuthConfig {
    /// Merge request entries, last write wins per registry
    ///
    /// Every entry is validated before anything is changed, so a rejected
    /// request leaves the document exactly as it was.
    pub fn merge(&mut self, entries: &[CredentialEntry]) -> Result<usize, CredentialError> {
        let resolved = entries
            .iter()
            .map(|entry| resolve(entry).map(|auth| (entry, auth)))
            .collect::<Result<Vec<_>, _>>()?;

        for (entry, auth) in resolved {
            if entry.insecure {
                // TLS settings belong to the build command, not the auth file
                warn!(
                    "Registry {} marked insecure; pass TLS options to the build command",
                    entry.registry
                );
            }
            debug!("Installing credentials for {}", entry.registry);
            self.auths
                .insert(entry.registry.clone(), AuthEntry::encoded(auth));
        }

        Ok(entries.len())
    }

}

#[cfg(test)]
impl AuthConfig {
    /// Encoded auth for a registry
    pub fn get(&self, registry: &str) -> Option<&str> {
        self.auths.get(registry).and_then(|e| e.auth.as_deref())
    }
}
