//! auth::authenticator
//!
//! Authenticator - [`AuthProvider`] implementation that owns the live credential.
//!
//! # Concurrency
//!
//! The credential lives behind a read/write lock; every mutation happens while
//! holding a separate refresh mutex, so refreshes are totally ordered. The
//! header path is double-checked:
//!
//! 1. Read-lock and check expiry; return the header if still valid
//! 2. Otherwise acquire the refresh mutex
//! 3. Re-check after acquiring it (another task may have refreshed)
//! 4. Refresh if still needed, persist, then publish the new credential
//!
//! N concurrent callers against an expired token therefore cause exactly one
//! call to the token endpoint. Readers observe either the old or the new
//! credential, never a mix.
//!
//! # Failure Policy
//!
//! A failed refresh leaves the previous credential in place and records the
//! error; the next call tries again. A refreshed credential that cannot be
//! persisted is still published, because the provider may already have
//! rotated the old refresh token.
//!
//! # Example
//!
//! ```ignore
//! use bbkt::auth::{Authenticator, AuthProvider, CredentialStore};
//! use std::sync::Arc;
//!
//! let store = CredentialStore::new()?;
//! let credential = store.load()?;
//! let auth = Arc::new(
//!     Authenticator::new(credential, token_url, http).with_store(store),
//! );
//! let header = auth.auth_header().await?;
//! ```

use chrono::{Duration, Utc};
use reqwest::header::HeaderValue;
use reqwest::Client;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::credential::{default_expiry_buffer, Credential, Grant, Scheme};
use super::errors::AuthError;
use super::store::CredentialStore;
use super::token_client::{OAuthClient, TokenClient};
use super::AuthProvider;

/// Runtime-only state guarded by the authenticator.
struct InFlightState {
    /// Credential currently in use.
    credential: Credential,

    /// Number of successful refreshes.
    generation: u64,

    /// Message from the most recent failed refresh.
    last_error: Option<String>,
}

/// Owns the live credential and refreshes it on demand.
pub struct Authenticator {
    state: RwLock<InFlightState>,

    /// Held for the whole of any refresh.
    refresh_lock: Mutex<()>,

    /// Token endpoint client; present for OAuth credentials.
    token_client: Option<TokenClient>,

    /// Where refreshed credentials are persisted.
    store: Option<CredentialStore>,

    buffer: Duration,
    scheme: Scheme,
    refreshable: bool,
}

impl Authenticator {
    /// Wrap a credential.
    ///
    /// # Arguments
    ///
    /// * `credential` - Credential to serve headers for
    /// * `token_url` - Token endpoint used for refresh grants
    /// * `http` - HTTP client shared with the request executor
    pub fn new(credential: Credential, token_url: impl Into<String>, http: Client) -> Self {
        let token_client = match &credential.grant {
            Grant::OAuth(g) => Some(TokenClient::with_client(
                http,
                OAuthClient::new(g.client_id.clone(), g.client_secret.clone()),
                token_url,
            )),
            Grant::Static(_) => None,
        };

        Self {
            scheme: credential.scheme(),
            refreshable: credential.is_refreshable(),
            state: RwLock::new(InFlightState {
                credential,
                generation: 0,
                last_error: None,
            }),
            refresh_lock: Mutex::new(()),
            token_client,
            store: None,
            buffer: default_expiry_buffer(),
        }
    }

    /// Persist refreshed credentials to `store`.
    ///
    /// Leave unset for credentials that came from the environment.
    pub fn with_store(mut self, store: CredentialStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Authenticate refreshes with `client` instead of the consumer recorded
    /// in the credential.
    ///
    /// The override lives only in this authenticator; credentials written back
    /// to the store keep their recorded consumer.
    pub fn with_oauth_client(mut self, client: OAuthClient) -> Self {
        self.token_client = self.token_client.take().map(|tc| tc.with_credentials(client));
        self
    }

    /// Override the expiry buffer.
    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }

    /// Snapshot of the credential in use.
    pub async fn credential(&self) -> Credential {
        self.state.read().await.credential.clone()
    }

    /// Message from the most recent failed refresh, cleared on success.
    pub async fn last_refresh_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// Number of successful refreshes performed by this instance.
    pub async fn refresh_count(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Slow path of [`AuthProvider::auth_header`]: refresh under the lock.
    async fn refresh_if_expired(&self) -> Result<HeaderValue, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        let current = {
            let state = self.state.read().await;
            if !state.credential.is_expired(Utc::now(), self.buffer) {
                debug!("credential refreshed by another caller");
                return state.credential.auth_header();
            }
            state.credential.clone()
        };

        if !current.is_refreshable() {
            return Err(AuthError::ReauthRequired(
                "access token expired and no refresh token is available".into(),
            ));
        }

        self.refresh_locked(&current).await?.auth_header()
    }

    /// Perform a refresh. Caller must hold `refresh_lock`.
    async fn refresh_locked(&self, current: &Credential) -> Result<Credential, AuthError> {
        let refresh_token = match &current.grant {
            Grant::OAuth(g) => g.refresh_token.as_deref().filter(|t| !t.is_empty()),
            Grant::Static(_) => None,
        }
        .ok_or_else(|| AuthError::ReauthRequired("credential cannot be refreshed".into()))?;

        let client = self
            .token_client
            .as_ref()
            .ok_or_else(|| AuthError::Internal("no token endpoint configured".into()))?;

        let response = match client.refresh(refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "token refresh failed; keeping previous credential");
                self.state.write().await.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let next = current.with_refreshed_tokens(response, Utc::now());

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&next) {
                warn!(error = %e, "refreshed credential could not be persisted");
            }
        }

        let mut state = self.state.write().await;
        state.credential = next.clone();
        state.generation += 1;
        state.last_error = None;
        info!(generation = state.generation, "access token refreshed");

        Ok(next)
    }
}

#[async_trait::async_trait]
impl AuthProvider for Authenticator {
    async fn auth_header(&self) -> Result<HeaderValue, AuthError> {
        {
            let state = self.state.read().await;
            if !state.credential.is_expired(Utc::now(), self.buffer) {
                return state.credential.auth_header();
            }
        }
        self.refresh_if_expired().await
    }

    async fn force_refresh(&self) -> Result<(), AuthError> {
        let seen = self.state.read().await.generation;
        let _guard = self.refresh_lock.lock().await;

        let current = {
            let state = self.state.read().await;
            if state.generation != seen {
                debug!("refresh completed while waiting; reusing it");
                return Ok(());
            }
            state.credential.clone()
        };

        if !current.is_refreshable() {
            return Err(AuthError::ReauthRequired(
                "credential was rejected and cannot be refreshed".into(),
            ));
        }

        self.refresh_locked(&current).await.map(|_| ())
    }

    fn supports_refresh(&self) -> bool {
        self.refreshable
    }

    fn scheme(&self) -> Scheme {
        self.scheme
    }
}

// Custom Debug to avoid exposing tokens
impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("scheme", &self.scheme)
            .field("refreshable", &self.refreshable)
            .field("persists", &self.store.is_some())
            .field("buffer_secs", &self.buffer.num_seconds())
            .finish_non_exhaustive()
    }
}
