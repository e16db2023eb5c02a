//! auth::store
//!
//! File-based credential storage.
//!
//! # Location
//!
//! Resolved in order:
//! 1. `$BBKT_CREDENTIALS` if set
//! 2. `$XDG_CONFIG_HOME/bbkt/credentials.json`
//! 3. `~/.config/bbkt/credentials.json`
//!
//! # Security
//!
//! - The directory is created 0700 and the file written 0600 on Unix
//! - Writes are atomic (write to temp file, fsync, then rename)
//! - Secrets are NEVER logged, printed, or included in error messages
//!
//! # Example
//!
//! ```ignore
//! use bbkt::auth::{Credential, CredentialStore};
//!
//! let store = CredentialStore::new()?;
//! store.save(&Credential::new_static("a@b.com", "tok123"))?;
//! let cred = store.load()?;
//! store.remove()?;
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};

use thiserror::Error;
use tracing::debug;

use super::credential::Credential;

/// Environment variable overriding the credential file location.
pub const CREDENTIALS_PATH_ENV: &str = "BBKT_CREDENTIALS";

/// Application directory name under the user config directory.
pub const APP_DIR: &str = "bbkt";

/// Credential file name.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Errors from credential storage.
///
/// Messages carry paths and OS errors only, never file contents.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No credential file exists.
    #[error("no credentials stored at '{}'", .0.display())]
    NotFound(PathBuf),

    /// The file exists but does not decode as a credential.
    #[error("cannot parse credentials at '{}': {message}", .path.display())]
    Parse {
        /// Path of the corrupt file
        path: PathBuf,
        /// Decoder message
        message: String,
    },

    /// Filesystem failure.
    #[error("{action} '{}': {source}", .path.display())]
    Io {
        /// What was being attempted
        action: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Neither a config directory nor a home directory could be determined.
    #[error("cannot determine a configuration directory for credentials")]
    NoConfigDir,
}

impl StoreError {
    fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Resolve the credential path from an environment lookup.
///
/// Pure function of its inputs; `home` is consulted only when neither
/// variable is set.
pub fn credentials_path_from<F>(lookup: F, home: Option<PathBuf>) -> Result<PathBuf, StoreError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(CREDENTIALS_PATH_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    if let Some(xdg) = lookup("XDG_CONFIG_HOME").filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(xdg).join(APP_DIR).join(CREDENTIALS_FILE));
    }

    home.map(|h| h.join(".config").join(APP_DIR).join(CREDENTIALS_FILE))
        .ok_or(StoreError::NoConfigDir)
}

/// Local credential file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    /// Path to the credential file
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store at the default location for this process environment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoConfigDir`] if no location can be determined.
    pub fn new() -> Result<Self, StoreError> {
        let path = credentials_path_from(|key| std::env::var(key).ok(), dirs::home_dir())?;
        Ok(Self { path })
    }

    /// Create a store at a custom path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether a credential file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist a credential, replacing any previous one atomically.
    pub fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent)?;
        }

        let content = serde_json::to_vec_pretty(credential).map_err(|e| StoreError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let temp_path = self.temp_path();
        let result = write_private_file(&temp_path, &content)
            .and_then(|()| {
                fs::rename(&temp_path, &self.path)
                    .map_err(|e| StoreError::io("cannot replace credentials file", &self.path, e))
            });

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result?;

        debug!(path = %self.path.display(), scheme = %credential.scheme(), "saved credentials");
        Ok(())
    }

    /// Load the stored credential.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if no file exists
    /// - [`StoreError::Parse`] if the file is corrupt
    pub fn load(&self) -> Result<Credential, StoreError> {
        let content = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(StoreError::io("cannot read credentials file", &self.path, e)),
        };

        serde_json::from_slice(&content).map_err(|e| StoreError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Remove the stored credential. Succeeds if there is nothing to remove.
    pub fn remove(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed credentials");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io("cannot remove credentials file", &self.path, e)),
        }
    }

    /// Verify file permissions are correct (Unix only).
    ///
    /// Returns true if the file doesn't exist or has 0600 permissions.
    #[cfg(unix)]
    pub fn verify_permissions(&self) -> Result<bool, StoreError> {
        match fs::metadata(&self.path) {
            Ok(metadata) => Ok(metadata.permissions().mode() & 0o777 == 0o600),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(StoreError::io("cannot read file metadata", &self.path, e)),
        }
    }

    /// Verify file permissions are correct (non-Unix always returns true).
    #[cfg(not(unix))]
    pub fn verify_permissions(&self) -> Result<bool, StoreError> {
        Ok(true)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| CREDENTIALS_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn create_private_dir(dir: &Path) -> Result<(), StoreError> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);

    builder
        .create(dir)
        .map_err(|e| StoreError::io("cannot create directory", dir, e))
}

fn write_private_file(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .map_err(|e| StoreError::io("cannot create temp file", path, e))?;

    // A stale temp file keeps its old mode, so set it explicitly before writing.
    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(0o600))
        .map_err(|e| StoreError::io("cannot set permissions on", path, e))?;

    file.write_all(content)
        .map_err(|e| StoreError::io("cannot write", path, e))?;
    file.sync_all()
        .map_err(|e| StoreError::io("cannot sync", path, e))?;
    Ok(())
}
