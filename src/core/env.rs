//! core::env
//!
//! Credential resolution from the environment and the credential store.
//!
//! # Precedence
//!
//! 1. `BITBUCKET_ACCESS_TOKEN` - static bearer credential
//! 2. `BITBUCKET_USERNAME` with `BITBUCKET_APP_PASSWORD` (or
//!    `BITBUCKET_API_TOKEN`) - static basic credential
//! 3. The stored credential
//!
//! Environment credentials are never written to disk. When both
//! `BITBUCKET_OAUTH_CLIENT_ID` and `BITBUCKET_OAUTH_CLIENT_SECRET` are set
//! they replace the consumer credentials of a stored OAuth grant and supply
//! the consumer for `bbkt auth --oauth`.

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::auth::{AuthError, Credential, CredentialStore, Grant, OAuthClient};

pub const ACCESS_TOKEN_ENV: &str = "BITBUCKET_ACCESS_TOKEN";
pub const USERNAME_ENV: &str = "BITBUCKET_USERNAME";
pub const APP_PASSWORD_ENV: &str = "BITBUCKET_APP_PASSWORD";
pub const API_TOKEN_ENV: &str = "BITBUCKET_API_TOKEN";
pub const OAUTH_CLIENT_ID_ENV: &str = "BITBUCKET_OAUTH_CLIENT_ID";
pub const OAUTH_CLIENT_SECRET_ENV: &str = "BITBUCKET_OAUTH_CLIENT_SECRET";

/// Where the active credential came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOrigin {
    /// `BITBUCKET_ACCESS_TOKEN`.
    AccessTokenEnv,
    /// `BITBUCKET_USERNAME` + `BITBUCKET_APP_PASSWORD`.
    AppPasswordEnv,
    /// `BITBUCKET_USERNAME` + `BITBUCKET_API_TOKEN`.
    ApiTokenEnv,
    /// The credential file.
    Store(PathBuf),
}

impl CredentialOrigin {
    /// Whether refreshed credentials may be written back.
    pub fn is_persistent(&self) -> bool {
        matches!(self, CredentialOrigin::Store(_))
    }
}

impl fmt::Display for CredentialOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialOrigin::AccessTokenEnv => {
                write!(f, "{} environment variable", ACCESS_TOKEN_ENV)
            }
            CredentialOrigin::AppPasswordEnv => write!(
                f,
                "{} + {} environment variables",
                USERNAME_ENV, APP_PASSWORD_ENV
            ),
            CredentialOrigin::ApiTokenEnv => write!(
                f,
                "{} + {} environment variables",
                USERNAME_ENV, API_TOKEN_ENV
            ),
            CredentialOrigin::Store(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Credential-related environment variables. Empty values count as unset.
#[derive(Clone, Default)]
pub struct EnvCredentials {
    pub access_token: Option<String>,
    pub username: Option<String>,
    pub app_password: Option<String>,
    pub api_token: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
}

impl EnvCredentials {
    /// Read from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read using `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            access_token: get(ACCESS_TOKEN_ENV),
            username: get(USERNAME_ENV),
            app_password: get(APP_PASSWORD_ENV),
            api_token: get(API_TOKEN_ENV),
            oauth_client_id: get(OAUTH_CLIENT_ID_ENV),
            oauth_client_secret: get(OAUTH_CLIENT_SECRET_ENV),
        }
    }

    /// Static credential supplied by the environment, if any.
    pub fn static_credential(&self) -> Option<(Credential, CredentialOrigin)> {
        if let Some(token) = &self.access_token {
            let identity = self.username.clone().unwrap_or_default();
            return Some((
                Credential::new_static_bearer(identity, token.clone()),
                CredentialOrigin::AccessTokenEnv,
            ));
        }

        let username = self.username.as_ref()?;
        if let Some(password) = &self.app_password {
            return Some((
                Credential::new_static(username.clone(), password.clone()),
                CredentialOrigin::AppPasswordEnv,
            ));
        }
        self.api_token.as_ref().map(|token| {
            (
                Credential::new_static(username.clone(), token.clone()),
                CredentialOrigin::ApiTokenEnv,
            )
        })
    }

    /// OAuth consumer from the environment, when both halves are set.
    pub fn oauth_client(&self) -> Option<OAuthClient> {
        match (&self.oauth_client_id, &self.oauth_client_secret) {
            (Some(id), Some(secret)) => Some(OAuthClient::new(id.clone(), secret.clone())),
            _ => None,
        }
    }
}

// Custom Debug to avoid exposing secrets
impl fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentials")
            .field("has_access_token", &self.access_token.is_some())
            .field("username", &self.username)
            .field("has_app_password", &self.app_password.is_some())
            .field("has_api_token", &self.api_token.is_some())
            .field("oauth_client_id", &self.oauth_client_id)
            .field("has_oauth_client_secret", &self.oauth_client_secret.is_some())
            .finish()
    }
}

/// The credential to use, where it came from, and where to persist it.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub credential: Credential,
    pub origin: CredentialOrigin,

    /// Store for write-back; `None` for environment credentials.
    pub store: Option<CredentialStore>,

    /// OAuth consumer from the environment, used in place of the stored one.
    /// Never persisted.
    pub oauth_client: Option<OAuthClient>,
}

/// Resolve the active credential.
///
/// # Errors
///
/// - [`AuthError::CredentialNotFound`] if nothing is configured
/// - [`AuthError::CredentialParse`] if the stored file is corrupt
pub fn resolve_credential(
    env: &EnvCredentials,
    store: &CredentialStore,
) -> Result<ResolvedCredential, AuthError> {
    if let Some((credential, origin)) = env.static_credential() {
        debug!(%origin, "using credential from environment");
        return Ok(ResolvedCredential {
            credential,
            origin,
            store: None,
            oauth_client: None,
        });
    }

    let credential = store.load()?;
    let oauth_client = match credential.grant {
        Grant::OAuth(_) => env.oauth_client(),
        Grant::Static(_) => None,
    };
    if oauth_client.is_some() {
        debug!("OAuth consumer overridden from environment");
    }

    Ok(ResolvedCredential {
        credential,
        origin: CredentialOrigin::Store(store.path().to_path_buf()),
        store: Some(store.clone()),
        oauth_client,
    })
}
