//! On-disk credential cache.
//!
//! Loads a persisted [`Credential`], refreshes it when it has expired, and
//! falls back to interactive consent when there is nothing usable on disk.
//! Any refreshed or newly acquired credential is written back.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::AuthFlow;
use crate::credential::Credential;
use crate::error::{DriveError, Result};

/// Credential cache backed by a single JSON file.
pub struct CredentialCache {
    path: PathBuf,
    flow: Box<dyn AuthFlow>,
    cached: RwLock<Option<Credential>>,
}

impl CredentialCache {
    /// Create a cache persisting to `path`, using `flow` to refresh or
    /// acquire credentials.
    pub fn new(path: impl Into<PathBuf>, flow: impl AuthFlow + 'static) -> Self {
        Self {
            path: path.into(),
            flow: Box::new(flow),
            cached: RwLock::new(None),
        }
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a valid credential covering `scopes`.
    ///
    /// Order of preference: the copy already loaded by this process, the
    /// cache file, a refresh of the cached credential, interactive consent.
    pub async fn obtain_credential<S: AsRef<str>>(&self, scopes: &[S]) -> Result<Credential> {
        let scopes: Vec<String> = scopes.iter().map(|s| s.as_ref().to_string()).collect();

        {
            let cached = self.cached.read().await;
            if let Some(credential) = cached.as_ref() {
                if credential.is_valid() && credential.has_scopes(&scopes) {
                    return Ok(credential.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;

        let stored = match cached.take() {
            Some(credential) => Some(credential),
            None => self.load()?,
        };

        let credential = match stored {
            Some(credential) if !credential.has_scopes(&scopes) => {
                // ask for the union with what was already granted
                let mut wanted = credential.scopes;
                for scope in &scopes {
                    if !wanted.contains(scope) {
                        wanted.push(scope.clone());
                    }
                }
                info!(path = ?self.path, scopes = ?wanted, "cached credential lacks requested scopes, requesting consent");
                self.flow.authorize(&wanted).await?
            }
            Some(credential) if credential.is_valid() => {
                debug!(path = ?self.path, "using cached credential");
                *cached = Some(credential.clone());
                return Ok(credential);
            }
            Some(mut credential)
                if credential.is_expired() && credential.refresh_token.is_some() =>
            {
                info!("access token expired, refreshing");
                self.flow.refresh(&mut credential).await?;
                credential
            }
            _ => {
                info!("no usable credential, requesting consent");
                self.flow.authorize(&scopes).await?
            }
        };

        if !credential.is_valid() {
            return Err(DriveError::Authorization(
                "token endpoint returned an already expired credential".to_string(),
            ));
        }

        self.save(&credential)?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Bearer token for `scopes`.
    pub async fn access_token<S: AsRef<str>>(&self, scopes: &[S]) -> Result<String> {
        Ok(self.obtain_credential(scopes).await?.access_token)
    }

    /// Read the cache file. A missing or unparsable file yields `None`.
    fn load(&self) -> Result<Option<Credential>> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "no credential cache file");
                return Ok(None);
            }
            Err(e) => return Err(DriveError::store(&self.path, e)),
        };

        match serde_json::from_slice(&content) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "ignoring unreadable credential cache");
                Ok(None)
            }
        }
    }

    /// Overwrite the cache file with `credential`.
    fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| DriveError::store(parent, e))?;
            }
        }

        let content = serde_json::to_string_pretty(credential)?;
        let store = |e| DriveError::store(&self.path, e);

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&self.path).map_err(store)?;

        // mode() only applies on creation; tighten a file left by an older run
        #[cfg(unix)]
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(store)?;

        file.write_all(content.as_bytes()).map_err(store)?;

        info!(path = ?self.path, "saved credential");
        Ok(())
    }
}
