//! cli::commands::status
//!
//! Report the active credential without revealing it.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};

use super::{open_store, Context};
use crate::auth::{default_expiry_buffer, AuthError, Credential, Grant, Presentation, ScopePolicy};
use crate::core::env::{resolve_credential, EnvCredentials, ResolvedCredential};
use crate::ui::output;

/// Run the status command.
pub fn status(ctx: &Context) -> Result<()> {
    let store = open_store()?;
    let resolved = match resolve_credential(&EnvCredentials::from_env(), &store) {
        Ok(resolved) => resolved,
        Err(AuthError::CredentialNotFound(_)) => {
            if ctx.quiet() {
                println!("not_authenticated");
            } else {
                println!("Not authenticated. Run 'bbkt auth' to log in.");
            }
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to read credentials"),
    };

    if ctx.quiet() {
        println!("authenticated");
        return Ok(());
    }

    let lines = describe(&resolved, ctx.config.scope_policy(), Utc::now());
    output::fields(headline(&resolved.credential), &lines, ctx.verbosity);

    if resolved.store.is_some() && !store.verify_permissions().unwrap_or(true) {
        output::warn(
            format!(
                "{} is readable by other users; run 'chmod 600' on it",
                store.path().display()
            ),
            ctx.verbosity,
        );
    }

    Ok(())
}

/// One-line summary of the credential kind.
fn headline(credential: &Credential) -> &'static str {
    match &credential.grant {
        Grant::Static(g) if g.presentation == Presentation::Bearer => {
            "Authenticated via access token (Bearer auth)"
        }
        Grant::Static(_) => "Authenticated via API token (Basic auth)",
        Grant::OAuth(_) => "Authenticated via OAuth 2.0 (Bearer auth)",
    }
}

/// Labelled status lines.
fn describe(
    resolved: &ResolvedCredential,
    policy: ScopePolicy,
    now: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
    let credential = &resolved.credential;
    let mut lines = vec![("Source", resolved.origin.to_string())];

    if let Some(identity) = credential.identity().filter(|i| !i.is_empty()) {
        lines.push(("Identity", identity.to_string()));
    }
    lines.push(("Secret", credential.masked_secret()));

    let scopes = credential.granted_scopes();
    let scope_text = if scopes.is_empty() {
        "unknown".to_string()
    } else {
        scopes.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    lines.push(("Scopes", scope_text));

    lines.push((
        "Stored",
        credential.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    ));

    if let Some(expiry) = credential.expires_at() {
        let state = if !credential.is_expired(now, default_expiry_buffer()) {
            format!("valid until {}", expiry.format("%Y-%m-%d %H:%M:%S UTC"))
        } else if credential.is_refreshable() {
            "expired (will auto-refresh)".to_string()
        } else {
            "expired (re-authentication required)".to_string()
        };
        lines.push(("Status", state));
    }

    let permitted: Vec<String> = policy
        .permitted(scopes)
        .iter()
        .map(ToString::to_string)
        .collect();
    lines.push((
        "Allows",
        if permitted.is_empty() {
            "nothing".to_string()
        } else {
            permitted.join(", ")
        },
    ));

    if let Some(store) = &resolved.store {
        lines.push(("File", store.path().display().to_string()));
    }

    lines
}
