//! cli::commands::auth
//!
//! Login command.
//!
//! # Design
//!
//! - API-token login prompts for an email and a masked secret, verifies them
//!   against `GET /user`, records the reported scopes and stores the result
//! - OAuth login runs the authorization-code flow with the consumer from the
//!   environment
//! - Secrets are NEVER printed
//!
//! # Example
//!
//! ```bash
//! bbkt auth
//! bbkt auth --email dev@example.com
//! bbkt auth --oauth --no-browser
//! ```

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};

use super::{open_store, runtime, Context};
use crate::auth::{AuthProvider, Authenticator, Credential, OAuthFlow};
use crate::client::{build_http_client, resources, RequestExecutor};
use crate::core::env::{EnvCredentials, OAUTH_CLIENT_ID_ENV, OAUTH_CLIENT_SECRET_ENV};
use crate::ui::output::{self, Verbosity};

/// Where API tokens are created.
const API_TOKEN_URL: &str = "https://id.atlassian.com/manage-profile/security/api-tokens";

/// Run the auth command.
///
/// # Arguments
///
/// * `ctx` - Command context
/// * `oauth` - Use the OAuth flow instead of an API token
/// * `email` - Account email for API-token login; prompted if absent
/// * `no_browser` - Print the authorization URL without opening it
pub fn auth(ctx: &Context, oauth: bool, email: Option<&str>, no_browser: bool) -> Result<()> {
    if oauth {
        oauth_login(ctx, no_browser)
    } else {
        token_login(ctx, email)
    }
}

/// API-token (or app password) login.
fn token_login(ctx: &Context, email: Option<&str>) -> Result<()> {
    let v = ctx.verbosity;
    output::progress(format!("Create an API token at:\n  {}\n", API_TOKEN_URL), v);

    let email = match email {
        Some(e) => e.trim().to_string(),
        None => prompt_line("Atlassian email: ")?,
    };
    if email.is_empty() {
        bail!("Email is required.");
    }

    let secret = rpassword::prompt_password("API token: ").context("Failed to read API token")?;
    let secret = secret.trim().to_string();
    if secret.is_empty() {
        bail!("API token is required.");
    }

    let credential = Credential::new_static(email, secret);
    let store = open_store()?;

    output::progress("Verifying credentials...", v);
    let http = build_http_client(ctx.config.request_timeout())?;
    let auth: Arc<dyn AuthProvider> = Arc::new(Authenticator::new(
        credential.clone(),
        ctx.config.endpoints().token_url,
        http.clone(),
    ));
    let executor = RequestExecutor::with_client(http, auth, ctx.config.api_base());

    let verified = runtime()?
        .block_on(resources::verify_credential(&executor))
        .context("Credential verification failed; check your email and API token")?;

    match verified.user.as_ref().and_then(|u| u.name()) {
        Some(name) => output::success(format!("Authenticated as: {}", name), v),
        None => output::success(
            "Token verified (it lacks account scope, so user details are unavailable).",
            v,
        ),
    }

    let credential = credential.with_granted_scopes(verified.scopes);
    store.save(&credential).context("Failed to save credentials")?;
    output::print(format!("Credentials saved to: {}", store.path().display()), v);
    Ok(())
}

/// OAuth authorization-code login.
fn oauth_login(ctx: &Context, no_browser: bool) -> Result<()> {
    let v = ctx.verbosity;
    let Some(client) = EnvCredentials::from_env().oauth_client() else {
        bail!(
            "OAuth consumer required. Set {} and {}.\n\n\
             Create one under Workspace settings > OAuth consumers with callback URL\n\
             http://127.0.0.1/callback (any port is accepted).",
            OAUTH_CLIENT_ID_ENV,
            OAUTH_CLIENT_SECRET_ENV
        );
    };

    let store = open_store()?;
    let flow = OAuthFlow::new(client, ctx.config.endpoints())
        .with_timeout(ctx.config.oauth_timeout())
        .with_request_timeout(ctx.config.request_timeout())
        .with_browser(!no_browser);

    let credential = runtime()?.block_on(async {
        let pending = flow.begin().await?;
        // without a browser the URL is the only way forward, even under --quiet
        let shown = if no_browser { Verbosity::Normal } else { v };
        output::progress(
            format!(
                "Open this URL to authorize bbkt:\n\n  {}\n\nWaiting for the redirect...",
                pending.authorize_url()
            ),
            shown,
        );
        pending.complete(&store).await
    })?;

    output::success("Authenticated via OAuth.", v);
    let scopes = credential.granted_scopes();
    if !scopes.is_empty() {
        let list: Vec<&str> = scopes.iter().map(String::as_str).collect();
        output::print(format!("Scopes: {}", list.join(", ")), v);
    }
    output::print(format!("Credentials saved to: {}", store.path().display()), v);
    Ok(())
}

/// Read one line from stdin after printing `prompt`.
fn prompt_line(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}
