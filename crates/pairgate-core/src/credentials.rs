// ── Credential store adapter ──
//
// The protocol client owns the credential format. We only know where the
// files live, whether any exist, and how to wipe them.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::CoreError;

/// Handle to the on-disk credential directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Whether a previously linked session is stored (directory exists and is non-empty).
    pub async fn exists(&self) -> bool {
        match tokio::fs::read_dir(&self.dir).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        }
    }

    /// Make sure the directory exists so the client can write into it.
    pub async fn load_or_create(&self) -> Result<&Path, CoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| self.io_error(source))?;
        Ok(&self.dir)
    }

    /// Remove all credentials. Returns `false` when nothing was stored.
    pub async fn destroy(&self) -> Result<bool, CoreError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                info!(path = %self.dir.display(), "session credentials destroyed");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.dir.display(), "no credentials to destroy");
                Ok(false)
            }
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: io::Error) -> CoreError {
        CoreError::Credentials {
            path: self.dir.display().to_string(),
            source,
        }
    }
}
