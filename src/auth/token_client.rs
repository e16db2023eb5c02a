//! auth::token_client
//!
//! HTTP client for the OAuth token endpoint.
//!
//! # Grants
//!
//! Two grants are supported, both sent as `application/x-www-form-urlencoded`
//! with the consumer key and secret as HTTP Basic credentials:
//!
//! - `authorization_code` - exchange the code from the browser redirect
//! - `refresh_token` - obtain a new access token without user interaction
//!
//! Non-2xx responses are surfaced with their status and body so the caller
//! can show the provider's diagnostic verbatim.
//!
//! # Example
//!
//! ```ignore
//! use bbkt::auth::{OAuthClient, TokenClient};
//!
//! let client = TokenClient::new(OAuthClient::new("key", "secret"), token_url, timeout)?;
//! let tokens = client.exchange_code(&code, &redirect_uri).await?;
//! let refreshed = client.refresh(&tokens.refresh_token.unwrap()).await?;
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::AuthError;
use crate::client::USER_AGENT_VALUE;

/// OAuth consumer credentials.
#[derive(Clone)]
pub struct OAuthClient {
    /// Consumer key.
    pub client_id: String,
    /// Consumer secret.
    pub client_secret: String,
}

impl OAuthClient {
    /// Create consumer credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Successful token response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// The refresh token, if issued.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token type (usually "bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Seconds until the access token expires.
    #[serde(default)]
    pub expires_in: u64,

    /// Granted scopes, space or comma separated.
    #[serde(default, alias = "scope")]
    pub scopes: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    /// Granted scopes as a set.
    pub fn granted_scopes(&self) -> BTreeSet<String> {
        self.scopes.as_deref().map(parse_scopes).unwrap_or_default()
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Split a scope string on whitespace and commas.
///
/// # Example
///
/// ```
/// use bbkt::auth::parse_scopes;
///
/// let scopes = parse_scopes("repository pullrequest:write, issue");
/// assert_eq!(scopes.len(), 3);
/// assert!(scopes.contains("pullrequest:write"));
/// ```
pub fn parse_scopes(raw: &str) -> BTreeSet<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Form body for the token endpoint.
#[derive(Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
enum TokenRequest<'a> {
    AuthorizationCode {
        code: &'a str,
        redirect_uri: &'a str,
    },
    RefreshToken {
        refresh_token: &'a str,
    },
}

/// Which grant a failed response belongs to.
#[derive(Debug, Clone, Copy)]
enum GrantKind {
    Exchange,
    Refresh,
}

/// Client for the provider's token endpoint.
#[derive(Clone)]
pub struct TokenClient {
    /// HTTP client.
    client: Client,

    /// Consumer credentials used as Basic auth.
    credentials: OAuthClient,

    /// Token endpoint URL.
    token_url: String,
}

impl TokenClient {
    /// Create a token client.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if the HTTP client cannot be built.
    pub fn new(
        credentials: OAuthClient,
        token_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, credentials, token_url))
    }

    /// Create a token client sharing an existing HTTP client.
    pub fn with_client(client: Client, credentials: OAuthClient, token_url: impl Into<String>) -> Self {
        Self {
            client,
            credentials,
            token_url: token_url.into(),
        }
    }

    /// Authenticate with different consumer credentials.
    pub fn with_credentials(mut self, credentials: OAuthClient) -> Self {
        self.credentials = credentials;
        self
    }

    /// The consumer credentials this client authenticates with.
    pub fn credentials(&self) -> &OAuthClient {
        &self.credentials
    }

    /// The token endpoint URL.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Build headers for token requests.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenExchangeFailed`] on a non-2xx response
    /// - [`AuthError::Network`] if the endpoint is unreachable
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        let request = TokenRequest::AuthorizationCode { code, redirect_uri };
        self.post(&request, GrantKind::Exchange).await
    }

    /// Obtain a new access token with a refresh token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::RefreshFailed`] on a non-2xx response
    /// - [`AuthError::Network`] if the endpoint is unreachable
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let request = TokenRequest::RefreshToken { refresh_token };
        self.post(&request, GrantKind::Refresh).await
    }

    async fn post(
        &self,
        request: &TokenRequest<'_>,
        kind: GrantKind,
    ) -> Result<TokenResponse, AuthError> {
        debug!(grant = ?kind, url = %self.token_url, "requesting token");

        let response = self
            .client
            .post(&self.token_url)
            .headers(self.headers())
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(grant = ?kind, status = status.as_u16(), "token endpoint rejected request");
            let status = status.as_u16();
            return Err(match kind {
                GrantKind::Exchange => AuthError::TokenExchangeFailed { status, body },
                GrantKind::Refresh => AuthError::RefreshFailed { status, body },
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            let message = format!("unexpected token response: {}", e);
            match kind {
                GrantKind::Exchange => AuthError::TokenExchangeFailed {
                    status: status.as_u16(),
                    body: message,
                },
                GrantKind::Refresh => AuthError::RefreshFailed {
                    status: status.as_u16(),
                    body: message,
                },
            }
        })
    }
}

impl fmt::Debug for TokenClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClient")
            .field("credentials", &self.credentials)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}
