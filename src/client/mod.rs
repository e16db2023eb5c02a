//! client
//!
//! Authenticated access to the Bitbucket Cloud REST API.
//!
//! # Modules
//!
//! - [`executor`]: Sends requests with a fresh `Authorization` header and
//!   retries once after a refresh when the server answers 401
//! - [`resources`]: Thin JSON helpers over the executor
//!
//! # Example
//!
//! ```ignore
//! use bbkt::client::{RequestExecutor, resources};
//!
//! let executor = RequestExecutor::new(auth, DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT)?;
//! let user: serde_json::Value = resources::get_json(&executor, "/user").await?;
//! ```

mod errors;
pub mod executor;
pub mod resources;

use std::time::Duration;

use reqwest::Client;

pub use errors::ApiError;
pub use executor::{ApiResponse, RequestBody, RequestExecutor};

/// Default Bitbucket Cloud API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.bitbucket.org/2.0";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User-Agent header for every outgoing request.
pub const USER_AGENT_VALUE: &str = concat!("bbkt/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the executor and the token endpoint.
///
/// # Errors
///
/// Returns [`ApiError::InvalidRequest`] if the TLS backend cannot be set up.
pub fn build_http_client(timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT_VALUE)
        .build()
        .map_err(|e| ApiError::InvalidRequest(format!("cannot build HTTP client: {}", e)))
}
