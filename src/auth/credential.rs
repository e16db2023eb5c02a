//! auth::credential
//!
//! Credential schema: a static secret or an OAuth token pair.
//!
//! # Design
//!
//! A [`Credential`] carries its issuance time plus exactly one [`Grant`]
//! variant. The JSON form is flat with a `scheme` tag:
//!
//! ```json
//! {
//!   "created_at": "2026-01-10T12:00:00Z",
//!   "scheme": "oauth",
//!   "access_token": "...",
//!   "refresh_token": "...",
//!   "token_type": "bearer",
//!   "expires_in_secs": 7200,
//!   "granted_scopes": ["pullrequest", "repository"],
//!   "client_id": "...",
//!   "client_secret": "..."
//! }
//! ```
//!
//! # Expiry
//!
//! OAuth expiry is `created_at + expires_in_secs`. A credential counts as
//! expired once `now >= expiry - buffer`, so a token with five minutes left is
//! refreshed before it can die mid-request. Static secrets never expire
//! client-side.
//!
//! # Security
//!
//! Secrets never appear in `Debug` output. JSON output does contain them
//! (that is what gets persisted).

use std::collections::BTreeSet;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};

use super::errors::AuthError;
use super::token_client::TokenResponse;

/// Buffer before expiry to trigger proactive refresh (5 minutes).
pub const EXPIRY_BUFFER_SECS: i64 = 300;

/// The default expiry buffer as a duration.
pub fn default_expiry_buffer() -> Duration {
    Duration::seconds(EXPIRY_BUFFER_SECS)
}

/// Which credential scheme is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// Long-lived secret (API token, app password, or opaque access token).
    Static,
    /// OAuth access token, optionally refreshable.
    #[serde(rename = "oauth")]
    OAuth,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Static => write!(f, "static"),
            Scheme::OAuth => write!(f, "oauth"),
        }
    }
}

/// How a static secret is presented on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    /// `Authorization: Basic base64(identity:secret)`
    #[default]
    Basic,
    /// `Authorization: Bearer secret`
    Bearer,
}

/// A persisted credential.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Time of last successful issuance or refresh.
    pub created_at: DateTime<Utc>,

    /// Scheme-specific fields.
    #[serde(flatten)]
    pub grant: Grant,
}

/// Scheme-specific credential fields.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum Grant {
    /// Static secret.
    Static(StaticGrant),
    /// OAuth token pair.
    #[serde(rename = "oauth")]
    OAuth(OAuthGrant),
}

/// Static secret fields.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticGrant {
    /// Account identity (usually an email address).
    pub identity: String,

    /// API token or app password.
    pub secret: String,

    /// Header form.
    #[serde(default)]
    pub presentation: Presentation,

    /// Scopes reported by the API; empty when unknown.
    #[serde(default)]
    pub granted_scopes: BTreeSet<String>,
}

/// OAuth token fields.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthGrant {
    /// Bearer access token.
    pub access_token: String,

    /// Refresh token; absent for non-refreshable grants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type, typically "bearer".
    pub token_type: String,

    /// Lifetime relative to `created_at`.
    pub expires_in_secs: u64,

    /// Scopes granted by the provider.
    #[serde(default)]
    pub granted_scopes: BTreeSet<String>,

    /// OAuth consumer key.
    pub client_id: String,

    /// OAuth consumer secret.
    pub client_secret: String,
}

impl Credential {
    /// Create a static credential presented as Basic auth.
    pub fn new_static(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            grant: Grant::Static(StaticGrant {
                identity: identity.into(),
                secret: secret.into(),
                presentation: Presentation::Basic,
                granted_scopes: BTreeSet::new(),
            }),
        }
    }

    /// Create a static credential presented as a Bearer token.
    pub fn new_static_bearer(identity: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            grant: Grant::Static(StaticGrant {
                identity: identity.into(),
                secret: token.into(),
                presentation: Presentation::Bearer,
                granted_scopes: BTreeSet::new(),
            }),
        }
    }

    /// Create an OAuth credential from a token endpoint response.
    pub fn from_token_response(
        response: TokenResponse,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let granted_scopes = response.granted_scopes();
        Self {
            created_at: now,
            grant: Grant::OAuth(OAuthGrant {
                access_token: response.access_token,
                refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
                token_type: response.token_type,
                expires_in_secs: response.expires_in,
                granted_scopes,
                client_id: client_id.into(),
                client_secret: client_secret.into(),
            }),
        }
    }

    /// The active scheme.
    pub fn scheme(&self) -> Scheme {
        match self.grant {
            Grant::Static(_) => Scheme::Static,
            Grant::OAuth(_) => Scheme::OAuth,
        }
    }

    /// Scopes recorded for this credential.
    pub fn granted_scopes(&self) -> &BTreeSet<String> {
        match &self.grant {
            Grant::Static(g) => &g.granted_scopes,
            Grant::OAuth(g) => &g.granted_scopes,
        }
    }

    /// Replace the recorded scopes.
    pub fn with_granted_scopes(mut self, scopes: BTreeSet<String>) -> Self {
        match &mut self.grant {
            Grant::Static(g) => g.granted_scopes = scopes,
            Grant::OAuth(g) => g.granted_scopes = scopes,
        }
        self
    }

    /// Absolute expiry instant, or `None` for static secrets.
    ///
    /// Saturates at the maximum representable instant.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match &self.grant {
            Grant::Static(_) => None,
            Grant::OAuth(g) => {
                let secs = i64::try_from(g.expires_in_secs).unwrap_or(i64::MAX);
                Some(
                    Duration::try_seconds(secs)
                        .and_then(|lifetime| self.created_at.checked_add_signed(lifetime))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                )
            }
        }
    }

    /// Check whether the credential is expired at `now`, given a safety buffer.
    ///
    /// Static credentials are never expired. OAuth credentials are expired once
    /// `now >= created_at + expires_in_secs - buffer`; an `expires_in_secs` of
    /// zero is therefore always expired.
    pub fn is_expired(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match self.expires_at() {
            None => false,
            Some(expiry) => match now.checked_add_signed(buffer) {
                Some(threshold) => threshold >= expiry,
                None => true,
            },
        }
    }

    /// Check whether the credential can be refreshed without user interaction.
    pub fn is_refreshable(&self) -> bool {
        match &self.grant {
            Grant::Static(_) => false,
            Grant::OAuth(g) => g.refresh_token.as_deref().is_some_and(|t| !t.is_empty()),
        }
    }

    /// Build the `Authorization` header value.
    ///
    /// The returned value is marked sensitive so it is elided from reqwest's
    /// own debug output.
    pub fn auth_header(&self) -> Result<HeaderValue, AuthError> {
        let raw = match &self.grant {
            Grant::Static(g) => match g.presentation {
                Presentation::Basic => {
                    let pair = format!("{}:{}", g.identity, g.secret);
                    format!("Basic {}", STANDARD.encode(pair))
                }
                Presentation::Bearer => format!("Bearer {}", g.secret),
            },
            Grant::OAuth(g) => format!("Bearer {}", g.access_token),
        };

        let mut value = HeaderValue::from_str(&raw).map_err(|_| {
            AuthError::InvalidCredential("secret contains characters not allowed in a header".into())
        })?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Apply a refresh response, producing the successor credential.
    ///
    /// The refresh token and scopes carry over when the provider omits them.
    /// `created_at` resets to `now`. Static credentials are returned unchanged.
    pub fn with_refreshed_tokens(&self, response: TokenResponse, now: DateTime<Utc>) -> Self {
        let Grant::OAuth(current) = &self.grant else {
            return self.clone();
        };

        let scopes = response.granted_scopes();
        Self {
            created_at: now,
            grant: Grant::OAuth(OAuthGrant {
                access_token: response.access_token,
                refresh_token: response
                    .refresh_token
                    .filter(|t| !t.is_empty())
                    .or_else(|| current.refresh_token.clone()),
                token_type: response.token_type,
                expires_in_secs: response.expires_in,
                granted_scopes: if scopes.is_empty() {
                    current.granted_scopes.clone()
                } else {
                    scopes
                },
                client_id: current.client_id.clone(),
                client_secret: current.client_secret.clone(),
            }),
        }
    }

    /// Short human-readable form of the secret, e.g. `abcd...wxyz`.
    pub fn masked_secret(&self) -> String {
        let secret = match &self.grant {
            Grant::Static(g) => &g.secret,
            Grant::OAuth(g) => &g.access_token,
        };
        mask(secret)
    }

    /// Display name for status output.
    pub fn identity(&self) -> Option<&str> {
        match &self.grant {
            Grant::Static(g) => Some(&g.identity),
            Grant::OAuth(_) => None,
        }
    }
}

/// Mask all but the first and last four characters of a secret.
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

// Custom Debug implementations to redact secrets

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("created_at", &self.created_at)
            .field("grant", &self.grant)
            .finish()
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::Static(g) => f.debug_tuple("Static").field(g).finish(),
            Grant::OAuth(g) => f.debug_tuple("OAuth").field(g).finish(),
        }
    }
}

impl fmt::Debug for StaticGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticGrant")
            .field("identity", &self.identity)
            .field("secret", &"[REDACTED]")
            .field("presentation", &self.presentation)
            .field("granted_scopes", &self.granted_scopes)
            .finish()
    }
}

impl fmt::Debug for OAuthGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthGrant")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_in_secs", &self.expires_in_secs)
            .field("granted_scopes", &self.granted_scopes)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}
