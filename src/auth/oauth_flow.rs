//! auth::oauth_flow
//!
//! OAuth 2.0 Authorization Code Grant driven through a local redirect listener.
//!
//! # Flow States
//!
//! ```text
//! Idle -> AwaitingRedirect -> Exchanging -> Succeeded
//!                 |               |
//!                 +---------------+-------> Failed
//! ```
//!
//! 1. [`OAuthFlow::begin`] generates a 256-bit `state`, starts the
//!    [`CallbackServer`], builds the authorization URL, and (optionally) opens
//!    the browser. It consumes the flow and returns a [`PendingAuthorization`].
//! 2. [`PendingAuthorization::complete`] waits for the redirect, exchanges the
//!    code at the token endpoint, and persists the new credential.
//!
//! The state is carried by the types: an [`OAuthFlow`] is idle, a
//! [`PendingAuthorization`] is awaiting the redirect, and the `Result` of
//! `complete` is the terminal state. Both steps consume their receiver, so a
//! retry always starts from a fresh [`OAuthFlow`].
//!
//! # Timeout
//!
//! The wait is bounded by a deadline measured from `begin` (5 minutes by
//! default). The listener is shut down before `complete` returns, whatever
//! the outcome.
//!
//! # Example
//!
//! ```ignore
//! use bbkt::auth::{CredentialStore, OAuthClient, OAuthFlow};
//!
//! let flow = OAuthFlow::new(OAuthClient::new(key, secret), endpoints);
//! let pending = flow.begin().await?;
//! println!("Open {} to authorize", pending.authorize_url());
//! let credential = pending.complete(&CredentialStore::new()?).await?;
//! ```

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use rand::RngCore;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::callback::CallbackServer;
use super::credential::Credential;
use super::errors::AuthError;
use super::store::CredentialStore;
use super::token_client::{OAuthClient, TokenClient};

/// Provider authorization endpoint.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://bitbucket.org/site/oauth2/authorize";

/// Provider token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://bitbucket.org/site/oauth2/access_token";

/// Default bound on waiting for the redirect.
pub const DEFAULT_FLOW_TIMEOUT: Duration = Duration::from_secs(300);

/// Bytes of entropy in the CSRF state token.
const STATE_BYTES: usize = 32;

/// OAuth endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    /// Browser authorization endpoint.
    pub authorize_url: String,
    /// Token endpoint for code exchange and refresh.
    pub token_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

/// Flow state, reported in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    /// Listener running, waiting for the browser redirect.
    AwaitingRedirect,
    /// Code received, talking to the token endpoint.
    Exchanging,
    /// Credential obtained and persisted.
    Succeeded,
    /// Attempt ended with an error.
    Failed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::AwaitingRedirect => "awaiting-redirect",
            FlowState::Exchanging => "exchanging",
            FlowState::Succeeded => "succeeded",
            FlowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A login attempt in the `Idle` state.
#[derive(Debug)]
pub struct OAuthFlow {
    client: OAuthClient,
    endpoints: OAuthEndpoints,
    timeout: Duration,
    request_timeout: Duration,
    open_browser: bool,
}

impl OAuthFlow {
    /// Create a flow with default timeouts that opens the system browser.
    pub fn new(client: OAuthClient, endpoints: OAuthEndpoints) -> Self {
        Self {
            client,
            endpoints,
            timeout: DEFAULT_FLOW_TIMEOUT,
            request_timeout: crate::client::DEFAULT_REQUEST_TIMEOUT,
            open_browser: true,
        }
    }

    /// Override the redirect wait bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the token endpoint request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Control whether `begin` launches the system browser.
    pub fn with_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// Start the listener and produce the authorization URL.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Listener`] if the local port cannot be bound
    /// - [`AuthError::Internal`] if the authorization URL is malformed
    pub async fn begin(self) -> Result<PendingAuthorization, AuthError> {
        let started = Instant::now();
        let csrf_state = generate_state();
        let token_client = TokenClient::new(
            self.client.clone(),
            &self.endpoints.token_url,
            self.request_timeout,
        )?;

        let mut server = CallbackServer::start(csrf_state.clone()).await?;
        let redirect_uri = server.redirect_uri();
        let authorize_url = build_authorize_url(
            &self.endpoints.authorize_url,
            &self.client.client_id,
            &csrf_state,
            &redirect_uri,
        )?;
        let outcome = server
            .take_outcome()
            .ok_or_else(|| AuthError::Internal("callback receiver already taken".into()))?;

        debug!(state = %FlowState::AwaitingRedirect, %redirect_uri, "OAuth flow started");

        if self.open_browser {
            if let Err(e) = open::that(authorize_url.as_str()) {
                warn!(error = %e, "could not open browser; open the URL manually");
            }
        }

        Ok(PendingAuthorization {
            authorize_url,
            redirect_uri,
            deadline: started + self.timeout,
            timeout: self.timeout,
            server,
            outcome,
            token_client,
        })
    }

    /// Run the whole flow: begin, wait, exchange, persist.
    pub async fn run(self, store: &CredentialStore) -> Result<Credential, AuthError> {
        self.begin().await?.complete(store).await
    }
}

/// A login attempt waiting for the browser redirect.
pub struct PendingAuthorization {
    authorize_url: Url,
    redirect_uri: String,
    deadline: Instant,
    timeout: Duration,
    server: CallbackServer,
    outcome: tokio::sync::oneshot::Receiver<super::callback::CallbackOutcome>,
    token_client: TokenClient,
}

impl PendingAuthorization {
    /// URL the user must visit to authorize.
    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    /// Redirect URI registered for this attempt.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the redirect, exchange the code, and persist the credential.
    ///
    /// The callback listener is closed before this returns.
    ///
    /// # Errors
    ///
    /// - [`AuthError::CsrfStateMismatch`] if the redirect's state differs
    /// - [`AuthError::AuthorizationDenied`] if the provider reported an error
    /// - [`AuthError::FlowTimeout`] if no redirect arrived in time
    /// - [`AuthError::TokenExchangeFailed`] if the token endpoint refused the code
    /// - [`AuthError::Storage`] if the credential cannot be persisted
    pub async fn complete(self, store: &CredentialStore) -> Result<Credential, AuthError> {
        let Self {
            redirect_uri,
            deadline,
            timeout,
            server,
            outcome,
            token_client,
            ..
        } = self;

        let waited = tokio::time::timeout_at(deadline, outcome).await;
        server.shutdown().await;

        let result = match waited {
            Err(_) => Err(AuthError::FlowTimeout(timeout)),
            Ok(Err(_)) => Err(AuthError::Internal("callback listener exited early".into())),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Ok(Ok(code))) => {
                debug!(state = %FlowState::Exchanging, "authorization code received");
                exchange(&token_client, &code, &redirect_uri, store).await
            }
        };

        match &result {
            Ok(credential) => info!(
                state = %FlowState::Succeeded,
                scopes = credential.granted_scopes().len(),
                "OAuth login completed"
            ),
            Err(e) => debug!(state = %FlowState::Failed, error = %e, "OAuth login failed"),
        }
        result
    }
}

impl fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // authorize_url carries the state token
        f.debug_struct("PendingAuthorization")
            .field("redirect_uri", &self.redirect_uri)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

async fn exchange(
    token_client: &TokenClient,
    code: &str,
    redirect_uri: &str,
    store: &CredentialStore,
) -> Result<Credential, AuthError> {
    let response = token_client.exchange_code(code, redirect_uri).await?;
    let credentials = token_client.credentials();
    let credential = Credential::from_token_response(
        response,
        credentials.client_id.clone(),
        credentials.client_secret.clone(),
        Utc::now(),
    );
    store.save(&credential)?;
    Ok(credential)
}

/// Random hex-encoded CSRF state.
fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build the provider authorization URL.
fn build_authorize_url(
    base: &str,
    client_id: &str,
    state: &str,
    redirect_uri: &str,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(base)
        .map_err(|e| AuthError::Internal(format!("invalid authorize URL '{}': {}", base, e)))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("state", state)
        .append_pair("redirect_uri", redirect_uri);
    Ok(url)
}
