//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Resolves the credential it needs
//! 2. Calls into `auth` / `client`
//! 3. Formats and displays output
//!
//! # Async Commands
//!
//! Commands that touch the network build a tokio runtime and `block_on`
//! their async body, keeping dispatch synchronous.

mod api;
mod auth;
mod completion;
mod logout;
mod status;

// Re-export command functions for testing and direct invocation
pub use api::api;
pub use auth::auth;
pub use completion::completion;
pub use logout::logout;
pub use status::status;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::runtime::Runtime;

use crate::auth::{AuthProvider, Authenticator, CredentialStore};
use crate::cli::args::Command;
use crate::client::{build_http_client, RequestExecutor};
use crate::core::config::Config;
use crate::core::env::ResolvedCredential;
use crate::ui::output::Verbosity;

/// Per-invocation settings shared by all handlers.
#[derive(Debug, Clone)]
pub struct Context {
    pub verbosity: Verbosity,
    pub config: Config,
}

impl Context {
    /// Whether output should be minimal.
    pub fn quiet(&self) -> bool {
        self.verbosity.is_quiet()
    }
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Auth {
            oauth,
            email,
            no_browser,
        } => auth::auth(ctx, oauth, email.as_deref(), no_browser),
        Command::Status => status::status(ctx),
        Command::Logout => logout::logout(ctx),
        Command::Api { method, path, data } => api::api(ctx, &method, &path, data.as_deref()),
        Command::Completion { shell } => completion::completion(shell),
    }
}

/// Build a runtime for a network-bound command.
fn runtime() -> Result<Runtime> {
    Runtime::new().context("Failed to start async runtime")
}

/// Open the credential store at its default location.
fn open_store() -> Result<CredentialStore> {
    CredentialStore::new().context("Failed to locate credential store")
}

/// Wire a resolved credential into an executor.
///
/// Refreshed credentials are written back only when the credential came from
/// the store. An OAuth consumer from the environment authenticates refreshes
/// without being persisted.
fn executor_for(ctx: &Context, resolved: ResolvedCredential) -> Result<RequestExecutor> {
    let http = build_http_client(ctx.config.request_timeout())?;
    let mut authenticator = Authenticator::new(
        resolved.credential,
        ctx.config.endpoints().token_url,
        http.clone(),
    );
    if let Some(store) = resolved.store {
        authenticator = authenticator.with_store(store);
    }
    if let Some(client) = resolved.oauth_client {
        authenticator = authenticator.with_oauth_client(client);
    }
    let auth: Arc<dyn AuthProvider> = Arc::new(authenticator);
    Ok(RequestExecutor::with_client(http, auth, ctx.config.api_base()))
}
