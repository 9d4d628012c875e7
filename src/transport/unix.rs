//! Unix domain socket listener implementation

use crate::transport::traits::{TransportListener, TransportStream};
use async_trait::async_trait;
use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

impl TransportStream for UnixStream {}

/// Listener bound to a filesystem socket path
///
/// The socket file is removed again when the listener is dropped.
pub struct UnixTransportListener {
    inner: UnixListener,
    path: PathBuf,
}

impl UnixTransportListener {
    /// Bind at `path`, replacing a stale socket file left by an earlier run
    pub fn bind(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_socket() => {
                debug!("Removing stale socket {}", path.display());
                fs::remove_file(path)?;
            }
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a socket", path.display()),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let inner = UnixListener::bind(path)?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

}

impl Drop for UnixTransportListener {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove socket {}: {}", self.path.display(), e);
            }
        }
    }
}

#[async_trait]
impl TransportListener for UnixTransportListener {
    type Stream = UnixStream;

    async fn accept(&self) -> io::Result<(Self::Stream, String)> {
        let (stream, _addr) = self.inner.accept().await?;
        // Unix peers are unnamed; identify them by the socket they came in on
        Ok((stream, format!("unix:{}", self.path.display())))
    }

    fn name(&self) -> &'static str {
        "unix"
    }

    fn local_description(&self) -> String {
        format!("unix://{}", self.path.display())
    }
}
