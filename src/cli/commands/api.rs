//! cli::commands::api
//!
//! Send an authenticated request and print the response body.

use std::collections::BTreeSet;

use anyhow::{bail, Context as _, Result};
use reqwest::Method;

use super::{executor_for, open_store, runtime, Context};
use crate::auth::{Capability, ScopePolicy};
use crate::client::{ApiError, RequestBody};
use crate::core::env::{resolve_credential, EnvCredentials};

/// Run the api command.
///
/// # Arguments
///
/// * `ctx` - Command context
/// * `method` - HTTP method, case-insensitive
/// * `path` - Path relative to the API base, or an absolute URL
/// * `data` - Optional JSON body
pub fn api(ctx: &Context, method: &str, path: &str, data: Option<&str>) -> Result<()> {
    let method = parse_method(method)?;
    let body = match data {
        Some(raw) => Some(RequestBody::Json(
            serde_json::from_str(raw).context("--data is not valid JSON")?,
        )),
        None => None,
    };

    let store = open_store()?;
    let resolved = resolve_credential(&EnvCredentials::from_env(), &store)?;
    check_scopes(
        resolved.credential.granted_scopes(),
        ctx.config.scope_policy(),
        &method,
        path,
    )?;
    let executor = executor_for(ctx, resolved)?;

    let result = runtime()?.block_on(executor.execute(method, path, body.as_ref()));
    let response = match result {
        Ok(response) => response,
        Err(e) if e.needs_reauth() => {
            return Err(e).context("Credential rejected; run 'bbkt auth' to log in again")
        }
        Err(e @ ApiError::Status { .. }) => return Err(e.into()),
        Err(e) => return Err(e).context("Request failed"),
    };

    let text = response.text();
    if text.is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}

/// Refuse a request the credential's scopes (or the policy for unknown
/// scopes) do not permit.
fn check_scopes(
    granted: &BTreeSet<String>,
    policy: ScopePolicy,
    method: &Method,
    path: &str,
) -> Result<()> {
    if policy.permits_request(granted, method, path) {
        return Ok(());
    }

    let action = match Capability::for_request(method, path) {
        Some(capability) => capability.to_string(),
        None => format!("{} requests", method),
    };
    if granted.is_empty() {
        bail!(
            "Not permitted to {}: the credential's scopes are unknown and scope_policy is {}.\n\
             Set scope_policy = \"allow_all\" in the config file to allow it.",
            action,
            policy
        );
    }
    let list: Vec<&str> = granted.iter().map(String::as_str).collect();
    bail!(
        "Not permitted to {}: granted scopes are {}.",
        action,
        list.join(", ")
    )
}

/// Parse an HTTP method name.
fn parse_method(raw: &str) -> Result<Method> {
    let upper = raw.to_ascii_uppercase();
    match upper.as_str() {
        "GET" | "POST" | "PUT" | "PATCH" | "DELETE" | "HEAD" => {
            Method::from_bytes(upper.as_bytes())
                .with_context(|| format!("invalid HTTP method '{}'", raw))
        }
        _ => bail!(
            "Unsupported HTTP method '{}'. Use GET, POST, PUT, PATCH, DELETE or HEAD.",
            raw
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_are_case_insensitive() {
        assert_eq!(parse_method("get").unwrap(), Method::GET);
        assert_eq!(parse_method("Delete").unwrap(), Method::DELETE);
    }

    #[test]
    fn unknown_scopes_refuse_writes_by_default() {
        let empty = BTreeSet::new();
        let err = check_scopes(
            &empty,
            ScopePolicy::ReadOnly,
            &Method::DELETE,
            "/repositories/ws/repo",
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("delete repositories"));
        assert!(message.contains("allow_all"));

        assert!(check_scopes(&empty, ScopePolicy::ReadOnly, &Method::GET, "/user").is_ok());
        assert!(check_scopes(
            &empty,
            ScopePolicy::AllowAll,
            &Method::DELETE,
            "/repositories/ws/repo"
        )
        .is_ok());
    }

    #[test]
    fn known_scopes_are_listed_on_refusal() {
        let granted: BTreeSet<String> = ["pullrequest".to_string()].into();
        let err = check_scopes(
            &granted,
            ScopePolicy::AllowAll,
            &Method::POST,
            "/repositories/ws/repo/pullrequests",
        )
        .unwrap_err();
        assert!(err.to_string().contains("granted scopes are pullrequest"));
    }

    #[test]
    fn unknown_methods_are_rejected() {
        assert!(parse_method("TRACE").is_err());
        assert!(parse_method("").is_err());
    }
}
