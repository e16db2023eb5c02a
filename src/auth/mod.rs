//! auth - Credential lifecycle for the Bitbucket Cloud API
//!
//! This module owns everything between "the user has a secret" and "a request
//! carries a valid `Authorization` header".
//!
//! # Architecture
//!
//! The auth system:
//! - Persists one credential per user in a private JSON file
//! - Supports static secrets (app passwords, API tokens) and OAuth grants
//! - Runs the OAuth authorization-code flow against a loopback listener
//! - Refreshes OAuth access tokens before expiry, once per expiry
//! - Never exposes secrets in logs, errors, or debug output
//!
//! # Components
//!
//! - [`Credential`] - Tagged static / OAuth credential record
//! - [`CredentialStore`] - Atomic, permission-restricted file persistence
//! - [`OAuthFlow`] - Interactive authorization-code grant
//! - [`TokenClient`] - HTTP client for the token endpoint
//! - [`Authenticator`] - Implementation of [`AuthProvider`]
//! - [`scopes`] - Scope-to-capability policy
//!
//! # Example
//!
//! ```ignore
//! use bbkt::auth::{Authenticator, AuthProvider, CredentialStore};
//! use std::sync::Arc;
//!
//! let store = CredentialStore::new()?;
//! let auth: Arc<dyn AuthProvider> = Arc::new(
//!     Authenticator::new(store.load()?, token_url, http).with_store(store),
//! );
//! let header = auth.auth_header().await?;
//! ```

mod authenticator;
mod callback;
mod credential;
mod errors;
mod oauth_flow;
pub mod scopes;
mod store;
mod token_client;

use reqwest::header::HeaderValue;

// Re-export public types
pub use authenticator::Authenticator;
pub use callback::{CallbackServer, CALLBACK_PATH};
pub use credential::{
    default_expiry_buffer, mask, Credential, Grant, OAuthGrant, Presentation, Scheme,
    StaticGrant, EXPIRY_BUFFER_SECS,
};
pub use errors::AuthError;
pub use oauth_flow::{
    OAuthEndpoints, OAuthFlow, PendingAuthorization, DEFAULT_AUTHORIZE_URL, DEFAULT_FLOW_TIMEOUT,
    DEFAULT_TOKEN_URL,
};
pub use scopes::{Capability, ScopePolicy};
pub use store::{credentials_path_from, CredentialStore, StoreError, CREDENTIALS_PATH_ENV};
pub use token_client::{parse_scopes, OAuthClient, TokenClient, TokenResponse};

/// Supplies `Authorization` headers to the request executor.
///
/// # Implementation Notes
///
/// Implementors must:
/// - Refresh transparently when the credential is near expiry
/// - Serialize refreshes so concurrent callers trigger at most one
/// - Never log or expose secret values
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns a header value for the current credential, refreshing first if
    /// it is expired or within the expiry buffer.
    ///
    /// # Errors
    ///
    /// - [`AuthError::ReauthRequired`] if expired and not refreshable
    /// - [`AuthError::RefreshFailed`] if the token endpoint rejects the refresh
    /// - [`AuthError::Network`] if the token endpoint is unreachable
    async fn auth_header(&self) -> Result<HeaderValue, AuthError>;

    /// Refresh regardless of expiry; used after the server rejected a
    /// credential that looked valid locally.
    ///
    /// Callers queued behind an in-flight refresh reuse its result.
    async fn force_refresh(&self) -> Result<(), AuthError>;

    /// Whether [`force_refresh`](Self::force_refresh) can succeed at all.
    fn supports_refresh(&self) -> bool;

    /// Scheme of the underlying credential.
    fn scheme(&self) -> Scheme;
}
