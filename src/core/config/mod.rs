//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. Environment variables (`BBKT_API_BASE`, `BBKT_AUTHORIZE_URL`,
//!    `BBKT_TOKEN_URL`)
//!
//! # Config File Locations
//!
//! Searched in order:
//! 1. `$BBKT_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/bbkt/config.toml`
//! 3. `~/.config/bbkt/config.toml`
//!
//! A missing file is not an error; a file that exists but does not parse is.
//!
//! # Example
//!
//! ```no_run
//! use bbkt::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("API: {}", config.api_base());
//! println!("Timeout: {:?}", config.request_timeout());
//! ```

pub mod schema;

pub use schema::FileConfig;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::auth::{OAuthEndpoints, ScopePolicy, DEFAULT_FLOW_TIMEOUT};
use crate::client::{DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "BBKT_CONFIG";

/// Environment overrides, as `(variable, key)` pairs.
const ENV_OVERRIDES: [(&str, &str); 3] = [
    ("BBKT_API_BASE", "api_base"),
    ("BBKT_AUTHORIZE_URL", "authorize_url"),
    ("BBKT_TOKEN_URL", "token_url"),
];

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {message}", .path.display())]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Effective configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Values from the file with environment overrides applied.
    pub file: FileConfig,

    /// Path of the loaded file, if any.
    loaded_from: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed,
    /// or if any value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| std::env::var(key).ok(), dirs::home_dir())
    }

    /// Load configuration using `lookup` for environment variables.
    pub fn load_from<F>(lookup: F, home: Option<PathBuf>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (mut file, loaded_from) = match Self::find_file(&lookup, home) {
            Some(path) => (Self::read_file(&path)?, Some(path)),
            None => (FileConfig::default(), None),
        };

        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                debug!(var, key, "config value overridden from environment");
                let slot = match key {
                    "api_base" => &mut file.api_base,
                    "authorize_url" => &mut file.authorize_url,
                    _ => &mut file.token_url,
                };
                *slot = Some(value);
            }
        }

        file.validate()?;
        Ok(Self { file, loaded_from })
    }

    /// Locate the config file, if one exists.
    fn find_file<F>(lookup: &F, home: Option<PathBuf>) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        // 1. Check $BBKT_CONFIG
        if let Some(path) = lookup(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check $XDG_CONFIG_HOME/bbkt/config.toml
        if let Some(xdg_home) = lookup("XDG_CONFIG_HOME").filter(|p| !p.is_empty()) {
            let path = PathBuf::from(xdg_home).join("bbkt/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Check ~/.config/bbkt/config.toml
        let path = home?.join(".config/bbkt/config.toml");
        path.exists().then_some(path)
    }

    /// Read and parse a config file.
    fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    // =========================================================================
    // Accessor methods with defaults
    // =========================================================================

    /// REST API base URL.
    pub fn api_base(&self) -> &str {
        self.file.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    /// OAuth endpoints.
    pub fn endpoints(&self) -> OAuthEndpoints {
        let defaults = OAuthEndpoints::default();
        OAuthEndpoints {
            authorize_url: self
                .file
                .authorize_url
                .clone()
                .unwrap_or(defaults.authorize_url),
            token_url: self.file.token_url.clone().unwrap_or(defaults.token_url),
        }
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.file
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// OAuth redirect wait.
    pub fn oauth_timeout(&self) -> Duration {
        self.file
            .oauth_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FLOW_TIMEOUT)
    }

    /// Policy for unknown scopes.
    pub fn scope_policy(&self) -> ScopePolicy {
        self.file.scope_policy.unwrap_or_default()
    }

    /// Path of the loaded config file.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }
}
