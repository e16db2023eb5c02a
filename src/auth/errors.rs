//! auth::errors
//!
//! Authentication error types for the credential lifecycle.
//!
//! # Design
//!
//! Error messages MUST NOT contain secrets. Variants that carry a response
//! body from the token endpoint hold the provider's diagnostic text, which
//! never echoes the tokens we sent.
//!
//! # Example
//!
//! ```
//! use bbkt::auth::AuthError;
//!
//! let err = AuthError::ReauthRequired("access token expired".to_string());
//! assert!(err.needs_reauth());
//! assert!(err.to_string().contains("bbkt auth"));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::store::StoreError;

/// Errors from authentication operations.
///
/// # Security
///
/// Error messages intentionally do not include token values.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No stored credential and no environment override.
    #[error("not authenticated (no credentials at '{}'). Run 'bbkt auth' to log in.", .0.display())]
    CredentialNotFound(PathBuf),

    /// Stored credential file exists but cannot be decoded.
    #[error("stored credentials at '{}' are unreadable: {message}. Run 'bbkt auth' to log in again.", .path.display())]
    CredentialParse {
        /// Path of the corrupt file
        path: PathBuf,
        /// Decoder message
        message: String,
    },

    /// The redirect carried a `state` that does not match the one we generated.
    #[error("OAuth state mismatch: the redirect did not originate from this login attempt")]
    CsrfStateMismatch,

    /// The provider redirected back with an `error` parameter.
    #[error("authorization denied: {error}{}", .description.as_deref().map(|d| format!(" ({})", d)).unwrap_or_default())]
    AuthorizationDenied {
        /// OAuth error code
        error: String,
        /// Provider supplied description, verbatim
        description: Option<String>,
    },

    /// The redirect arrived without a `code` parameter.
    #[error("authorization redirect did not include a code")]
    MissingAuthorizationCode,

    /// No redirect arrived within the allowed window.
    #[error("timed out after {}s waiting for the OAuth redirect", .0.as_secs())]
    FlowTimeout(Duration),

    /// Token endpoint rejected the authorization code.
    #[error("token exchange failed: HTTP {status}: {body}")]
    TokenExchangeFailed {
        /// HTTP status code
        status: u16,
        /// Response body from the token endpoint
        body: String,
    },

    /// Token endpoint rejected the refresh grant.
    #[error("token refresh failed: HTTP {status}: {body}")]
    RefreshFailed {
        /// HTTP status code
        status: u16,
        /// Response body from the token endpoint
        body: String,
    },

    /// Token expired and cannot be refreshed silently.
    #[error("re-authentication required: {0}. Run 'bbkt auth --oauth' again.")]
    ReauthRequired(String),

    /// Local callback listener could not be started.
    #[error("cannot start OAuth callback listener: {0}")]
    Listener(String),

    /// Credential fields cannot be turned into a request header.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Credential storage failure other than not-found or parse.
    #[error("credential store error: {0}")]
    Storage(String),

    /// Network error talking to the provider.
    #[error("network error: {0}")]
    Network(String),

    /// Internal error (should not happen).
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Check if this error indicates the user needs to log in again.
    ///
    /// Returns true for errors that can be resolved by running `bbkt auth`.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            AuthError::CredentialNotFound(_)
                | AuthError::CredentialParse { .. }
                | AuthError::ReauthRequired(_)
        )
    }

    /// Check if this error indicates a transient failure that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(_) => true,
            AuthError::RefreshFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this error ends an OAuth login attempt.
    pub fn is_flow_failure(&self) -> bool {
        matches!(
            self,
            AuthError::CsrfStateMismatch
                | AuthError::AuthorizationDenied { .. }
                | AuthError::MissingAuthorizationCode
                | AuthError::FlowTimeout(_)
                | AuthError::TokenExchangeFailed { .. }
                | AuthError::Listener(_)
        )
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => AuthError::CredentialNotFound(path),
            StoreError::Parse { path, message } => AuthError::CredentialParse { path, message },
            other => AuthError::Storage(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        // URLs may carry an authorization code in the query.
        AuthError::Network(err.without_url().to_string())
    }
}
