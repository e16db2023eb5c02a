//! core::config::schema
//!
//! Configuration file schema.
//!
//! # Example
//!
//! ```toml
//! api_base = "https://api.bitbucket.org/2.0"
//! token_url = "https://bitbucket.org/site/oauth2/access_token"
//! request_timeout_secs = 30
//! oauth_timeout_secs = 300
//! scope_policy = "read_only"
//! ```

use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;
use crate::auth::ScopePolicy;

/// User configuration file.
///
/// Every field is optional; unset fields fall back to built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// REST API base URL.
    pub api_base: Option<String>,

    /// OAuth authorization endpoint.
    pub authorize_url: Option<String>,

    /// OAuth token endpoint.
    pub token_url: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,

    /// How long the OAuth flow waits for the browser redirect, in seconds.
    pub oauth_timeout_secs: Option<u64>,

    /// What unknown scopes permit.
    pub scope_policy: Option<ScopePolicy>,
}

impl FileConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("api_base", &self.api_base),
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
        ] {
            if let Some(value) = value {
                validate_http_url(key, value)?;
            }
        }

        for (key, value) in [
            ("request_timeout_secs", self.request_timeout_secs),
            ("oauth_timeout_secs", self.oauth_timeout_secs),
        ] {
            if value == Some(0) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be greater than zero",
                    key
                )));
            }
        }

        Ok(())
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidValue(format!("{} '{}': {}", key, value, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue(format!(
            "{} '{}': unsupported scheme '{}', must be http or https",
            key, value, other
        ))),
    }
}
