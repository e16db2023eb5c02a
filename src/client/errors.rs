//! client::errors
//!
//! Error types for API requests.

use thiserror::Error;

use crate::auth::AuthError;

/// Longest response body kept in an error's display form.
const BODY_PREVIEW_CHARS: usize = 512;

/// Errors from authenticated API requests.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable credential, or refreshing it failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The server answered with a non-2xx status.
    #[error("API returned HTTP {status}: {}", preview(.body))]
    Status {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Network or connection error, including timeouts.
    #[error("network error: {0}")]
    Network(String),

    /// A 2xx body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the user must log in again to make progress.
    pub fn needs_reauth(&self) -> bool {
        match self {
            ApiError::Auth(e) => e.needs_reauth(),
            ApiError::Status { status, .. } => *status == 401,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return ApiError::InvalidRequest(err.without_url().to_string());
        }
        ApiError::Network(err.without_url().to_string())
    }
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(BODY_PREVIEW_CHARS).collect();
    format!("{}...", cut)
}
