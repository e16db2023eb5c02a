//! client::resources
//!
//! Stateless JSON helpers over [`RequestExecutor`].
//!
//! Each helper takes the executor and a resource path (relative to the API
//! base, or an absolute pagination link on the same origin) and returns the
//! decoded body.
//! Resource-specific error schemas are left to callers.

use std::collections::BTreeSet;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::ApiError;
use super::executor::{RequestBody, RequestExecutor};
use crate::auth::parse_scopes;

/// Response header listing the scopes of the presented credential.
pub const SCOPES_HEADER: &str = "x-oauth-scopes";

/// Standard Bitbucket pagination envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    /// Total number of items, when reported.
    #[serde(default)]
    pub size: Option<u64>,

    /// Current page number, when reported.
    #[serde(default)]
    pub page: Option<u64>,

    /// Page length.
    #[serde(default)]
    pub pagelen: Option<u64>,

    /// Absolute URL of the next page.
    #[serde(default)]
    pub next: Option<String>,

    /// Absolute URL of the previous page.
    #[serde(default)]
    pub previous: Option<String>,

    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
}

/// Account behind the presented credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

impl CurrentUser {
    /// Best available human-readable name.
    pub fn name(&self) -> Option<&str> {
        [&self.display_name, &self.nickname, &self.username]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
    }
}

/// Outcome of checking a credential against `GET /user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Account details; `None` when the credential lacks account scope.
    pub user: Option<CurrentUser>,

    /// Scopes reported by the server; empty when unknown.
    pub scopes: BTreeSet<String>,
}

/// GET and decode JSON.
pub async fn get_json<T: DeserializeOwned>(
    executor: &RequestExecutor,
    path: &str,
) -> Result<T, ApiError> {
    executor.execute(Method::GET, path, None).await?.json()
}

/// GET a single page of a paginated collection.
pub async fn get_paginated<T: DeserializeOwned>(
    executor: &RequestExecutor,
    path: &str,
) -> Result<Paginated<T>, ApiError> {
    get_json(executor, path).await
}

/// GET up to `max_pages` pages, following `next` links.
pub async fn get_all<T: DeserializeOwned>(
    executor: &RequestExecutor,
    path: &str,
    max_pages: usize,
) -> Result<Vec<T>, ApiError> {
    let mut items = Vec::new();
    let mut next = Some(path.to_string());
    let mut pages = 0;

    while let Some(url) = next.take() {
        if pages == max_pages {
            debug!(pages, "page limit reached");
            break;
        }
        let page: Paginated<T> = get_paginated(executor, &url).await?;
        items.extend(page.values);
        next = page.next;
        pages += 1;
    }

    Ok(items)
}

/// POST a JSON body and decode the JSON response.
pub async fn post_json<T: DeserializeOwned>(
    executor: &RequestExecutor,
    path: &str,
    body: serde_json::Value,
) -> Result<T, ApiError> {
    let body = RequestBody::Json(body);
    executor
        .execute(Method::POST, path, Some(&body))
        .await?
        .json()
}

/// PUT a JSON body and decode the JSON response.
pub async fn put_json<T: DeserializeOwned>(
    executor: &RequestExecutor,
    path: &str,
    body: serde_json::Value,
) -> Result<T, ApiError> {
    let body = RequestBody::Json(body);
    executor
        .execute(Method::PUT, path, Some(&body))
        .await?
        .json()
}

/// DELETE a resource, discarding any body.
pub async fn delete(executor: &RequestExecutor, path: &str) -> Result<(), ApiError> {
    executor.execute(Method::DELETE, path, None).await?;
    Ok(())
}

/// GET a resource as text (file contents, diffs, logs).
pub async fn get_raw(executor: &RequestExecutor, path: &str) -> Result<String, ApiError> {
    Ok(executor.execute(Method::GET, path, None).await?.text())
}

/// Fetch the current account and the scopes the server reports.
pub async fn current_user(executor: &RequestExecutor) -> Result<Verification, ApiError> {
    let response = executor.execute(Method::GET, "/user", None).await?;
    let scopes = response
        .header(SCOPES_HEADER)
        .map(parse_scopes)
        .unwrap_or_default();
    Ok(Verification {
        user: Some(response.json()?),
        scopes,
    })
}

/// Check that a credential is accepted.
///
/// A 403 on `/user` means the credential is valid but lacks account scope;
/// it is reported as verified with no user details.
pub async fn verify_credential(executor: &RequestExecutor) -> Result<Verification, ApiError> {
    match current_user(executor).await {
        Err(ApiError::Status { status: 403, .. }) => {
            debug!("credential accepted without account scope");
            Ok(Verification {
                user: None,
                scopes: BTreeSet::new(),
            })
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Authenticator, AuthProvider, Credential};
    use reqwest::Client;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(server: &MockServer) -> RequestExecutor {
        let auth: Arc<dyn AuthProvider> = Arc::new(Authenticator::new(
            Credential::new_static("dev@example.com", "app-password"),
            format!("{}/token", server.uri()),
            Client::new(),
        ));
        RequestExecutor::with_client(Client::new(), auth, server.uri())
    }

    #[tokio::test]
    async fn current_user_reads_scopes_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(SCOPES_HEADER, "repository:write, pullrequest")
                    .set_body_json(serde_json::json!({
                        "display_name": "Dev Eloper",
                        "account_id": "123"
                    })),
            )
            .mount(&server)
            .await;

        let verified = current_user(&executor(&server)).await.expect("user");
        let user = verified.user.expect("user details");
        assert_eq!(user.name(), Some("Dev Eloper"));
        assert!(verified.scopes.contains("repository:write"));
        assert!(verified.scopes.contains("pullrequest"));
    }

    #[tokio::test]
    async fn forbidden_user_lookup_still_verifies() {
        let server = MockServer::start().await;
        Mock::given(path("/user"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let verified = verify_credential(&executor(&server)).await.expect("verified");
        assert!(verified.user.is_none());
        assert!(verified.scopes.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_user_lookup_fails_verification() {
        let server = MockServer::start().await;
        Mock::given(path("/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = verify_credential(&executor(&server)).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn get_all_follows_next_links_up_to_limit() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(path("/repositories/ws"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [3],
                "next": format!("{}/repositories/ws?page=3", base)
            })))
            .mount(&server)
            .await;
        Mock::given(path("/repositories/ws"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [4]
            })))
            .mount(&server)
            .await;
        Mock::given(path("/repositories/ws"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [1, 2],
                "next": format!("{}/repositories/ws?page=2", base)
            })))
            .mount(&server)
            .await;

        let executor = executor(&server);
        let all: Vec<u32> = get_all(&executor, "/repositories/ws", 10).await.expect("all");
        assert_eq!(all, vec![1, 2, 3, 4]);

        let capped: Vec<u32> = get_all(&executor, "/repositories/ws", 2).await.expect("capped");
        assert_eq!(capped, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn get_all_refuses_next_link_to_another_host() {
        let server = MockServer::start().await;
        let foreign = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [2]
            })))
            .expect(0)
            .mount(&foreign)
            .await;
        Mock::given(path("/repositories/ws"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [1],
                "next": format!("{}/collect", foreign.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = get_all::<u32>(&executor(&server), "/repositories/ws", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn delete_and_raw_helpers() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/diff"))
            .respond_with(ResponseTemplate::new(200).set_body_string("--- a\n+++ b\n"))
            .mount(&server)
            .await;

        let executor = executor(&server);
        delete(&executor, "/repositories/ws/repo/refs/branches/x")
            .await
            .expect("delete");
        assert!(get_raw(&executor, "/diff").await.expect("raw").starts_with("--- a"));
    }

    #[test]
    fn current_user_name_prefers_display_name() {
        let user = CurrentUser {
            display_name: Some(String::new()),
            nickname: Some("nick".into()),
            ..Default::default()
        };
        assert_eq!(user.name(), Some("nick"));
        assert_eq!(CurrentUser::default().name(), None);
    }
}
