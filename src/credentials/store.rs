//! On-disk credential store

use super::auths::AuthConfig;
use crate::error::CredentialError;
use build_runner_shared::CredentialEntry;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Location used when no auth file is configured: `.docker/config.json`
/// next to the running executable
pub fn default_auth_file() -> io::Result<PathBuf> {
    let executable = std::env::current_exe()?;
    let dir = executable
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(dir.join(".docker").join("config.json"))
}

/// Registry credentials persisted at a fixed path
///
/// Nothing is cached between requests: every [`apply`](Self::apply) reads
/// the file, merges, and rewrites it. The read-merge-write cycle is
/// serialised by an in-process lock and the write replaces the file
/// atomically, so concurrent requests never lose each other's entries and a
/// running command never sees a half-written file.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the store; an absent file is an empty store
    pub async fn load(&self) -> Result<AuthConfig, CredentialError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Credential store {} not found, starting empty", self.path.display());
                return Ok(AuthConfig::default());
            }
            Err(source) => {
                return Err(CredentialError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&content).map_err(|source| CredentialError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Write the store, creating its directory if needed
    pub async fn save(&self, config: &AuthConfig) -> Result<(), CredentialError> {
        let mut content =
            serde_json::to_vec_pretty(config).map_err(|source| CredentialError::Encode {
                path: self.path.clone(),
                source,
            })?;
        content.push(b'\n');

        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || write_atomic(&path, &content))
            .await
            .unwrap_or_else(|join_err| Err(io::Error::other(join_err)));

        result.map_err(|source| CredentialError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            "Saved {} registries to {}",
            config.auths.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Load, merge `entries`, and save, as one serialised step
    ///
    /// Returns the number of entries merged. When `entries` is empty the
    /// file is still read (a corrupt store fails the request) but not
    /// rewritten.
    pub async fn apply(&self, entries: &[CredentialEntry]) -> Result<usize, CredentialError> {
        let _guard = self.lock.lock().await;

        let mut config = self.load().await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let merged = config.merge(entries)?;
        self.save(&config).await?;

        info!(
            "Installed credentials for {} registr{} in {}",
            merged,
            if merged == 1 { "y" } else { "ies" },
            self.path.display()
        );
        Ok(merged)
    }
}

/// Replace `path` with `contents` via a temp file in the same directory
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    if !parent.exists() {
        fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
        }
    }

    // NamedTempFile is created with mode 0600
    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::encode_basic_auth;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_absent_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("config.json"));
        let config = store.load().await.unwrap();
        assert!(config.auths.is_empty());
    }

    #[tokio::test]
    async fn test_apply_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".docker").join("config.json");
        let store = CredentialStore::new(&path);

        store
            .apply(&[CredentialEntry::basic("r", "u", "p")])
            .await
            .unwrap();
        assert!(path.exists());

        // A fresh store object sees the same data: nothing is cached
        let reloaded = CredentialStore::new(&path).load().await.unwrap();
        assert_eq!(reloaded.get("r"), Some(encode_basic_auth("u", "p").as_str()));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["auths"]["r"]["auth"], encode_basic_auth("u", "p"));
    }

    #[tokio::test]
    async fn test_reapply_overwrites_registry() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("config.json"));

        store
            .apply(&[CredentialEntry::basic("r", "u", "p1")])
            .await
            .unwrap();
        store
            .apply(&[CredentialEntry::basic("r", "u", "p2")])
            .await
            .unwrap();

        let config = store.load().await.unwrap();
        assert_eq!(config.auths.len(), 1);
        assert_eq!(config.get("r"), Some(encode_basic_auth("u", "p2").as_str()));
    }

    #[tokio::test]
    async fn test_rejected_entry_leaves_file_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = CredentialStore::new(&path);
        store
            .apply(&[CredentialEntry::basic("r", "u", "p")])
            .await
            .unwrap();
        let before = std::fs::read(&path).unwrap();

        let conflicting = CredentialEntry {
            registry: "r".into(),
            auth: Some("xyz".into()),
            username: Some("other".into()),
            ..Default::default()
        };
        let result = store.apply(&[conflicting]).await;

        assert!(matches!(result, Err(CredentialError::ConflictingAuth { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_rejected_entry_creates_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = CredentialStore::new(&path);

        let conflicting = CredentialEntry {
            registry: "r".into(),
            auth: Some("xyz".into()),
            username: Some("u".into()),
            ..Default::default()
        };
        assert!(store.apply(&[conflicting]).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_malformed_store_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = CredentialStore::new(&path);
        assert!(matches!(
            store.load().await,
            Err(CredentialError::Malformed { .. })
        ));
        assert!(matches!(
            store.apply(&[]).await,
            Err(CredentialError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_blank_store_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "  \n").unwrap();

        let store = CredentialStore::new(&path);
        assert!(matches!(
            store.load().await,
            Err(CredentialError::Malformed { .. })
        ));
        assert!(store
            .apply(&[CredentialEntry::basic("r", "u", "p")])
            .await
            .is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "  \n");
    }

    #[tokio::test]
    async fn test_empty_entries_do_not_create_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = CredentialStore::new(&path);
        assert_eq!(store.apply(&[]).await.unwrap(), 0);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_permissions_are_restrictive() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("auth").join("config.json");
        let store = CredentialStore::new(&path);
        store
            .apply(&[CredentialEntry::basic("r", "u", "p")])
            .await
            .unwrap();

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        assert_eq!(file_mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_concurrent_applies_keep_every_registry() {
        let dir = tempdir().unwrap();
        let store = Arc::new(CredentialStore::new(dir.path().join("config.json")));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .apply(&[CredentialEntry::basic(format!("r{i}"), "u", "p")])
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let config = store.load().await.unwrap();
        assert_eq!(config.auths.len(), 16);
    }

    #[test]
    fn test_default_auth_file_is_beside_executable() {
        let path = default_auth_file().unwrap();
        assert!(path.ends_with(".docker/config.json"));
    }
}
