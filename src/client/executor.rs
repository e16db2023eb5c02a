//! client::executor
//!
//! Sends API requests with a fresh `Authorization` header.
//!
//! # Retry Policy
//!
//! Each request gets a header from the [`AuthProvider`] immediately before
//! sending. If the server answers 401 and the credential can be refreshed,
//! the executor forces one refresh and repeats the request exactly once. A
//! second 401 is returned to the caller as [`ApiError::Status`]. Static
//! credentials are never retried.
//!
//! Bodies are held by reference so the retry sends the same bytes.
//!
//! Requests only go to the API base's origin; an absolute URL on any other
//! origin is rejected before a header is produced.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::errors::ApiError;
use super::build_http_client;
use crate::auth::AuthProvider;

/// Which send this is for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retry,
}

/// A request body that can be sent more than once.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized as `application/json`.
    Json(serde_json::Value),

    /// Sent verbatim with the given content type.
    Raw {
        /// Content-Type header value
        content_type: String,
        /// Body bytes
        bytes: Vec<u8>,
    },
}

/// A successful (2xx) response, fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Raw body bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Decode`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Executes authenticated requests against one API base URL.
#[derive(Clone)]
pub struct RequestExecutor {
    client: Client,
    auth: Arc<dyn AuthProvider>,
    api_base: String,
}

// Custom Debug; the provider is opaque
impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("api_base", &self.api_base)
            .field("scheme", &self.auth.scheme())
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    /// Create an executor with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] if the HTTP client cannot be built.
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self::with_client(build_http_client(timeout)?, auth, api_base))
    }

    /// Create an executor sharing an existing HTTP client.
    pub fn with_client(
        client: Client,
        auth: Arc<dyn AuthProvider>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// The API base URL, without a trailing slash.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// The provider supplying headers.
    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// Resolve a resource path against the base URL.
    ///
    /// Absolute URLs (e.g. pagination `next` links) are accepted only when
    /// they share the base URL's scheme, host and port; credentials are never
    /// sent anywhere else.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] for an absolute URL on another
    /// origin, or if either URL cannot be parsed.
    pub fn url(&self, path: &str) -> Result<String, ApiError> {
        if !(path.starts_with("https://") || path.starts_with("http://")) {
            return Ok(format!("{}/{}", self.api_base, path.trim_start_matches('/')));
        }

        let base = Url::parse(&self.api_base)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid API base: {}", e)))?;
        let target = Url::parse(path)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid URL: {}", e)))?;

        if target.origin() != base.origin() {
            warn!(
                host = target.host_str().unwrap_or(""),
                "refusing to send credentials outside the API base"
            );
            return Err(ApiError::InvalidRequest(format!(
                "URL is not under the API base {}",
                self.api_base
            )));
        }
        Ok(target.into())
    }

    /// Send a request and return the fully read 2xx response.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Auth`] if no header can be produced or the refresh fails
    /// - [`ApiError::Status`] for any non-2xx status after the possible retry
    /// - [`ApiError::Network`] on transport failure or timeout
    /// - [`ApiError::InvalidRequest`] for an absolute URL off the API base
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&RequestBody>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(path)?;
        let mut attempt = Attempt::First;

        loop {
            let header = self.auth.auth_header().await?;
            debug!(%method, %url, ?attempt, "sending request");
            let response = self.send(method.clone(), &url, header, body).await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED
                && attempt == Attempt::First
                && self.auth.supports_refresh()
            {
                debug!(%url, "credential rejected; refreshing before one retry");
                self.auth.force_refresh().await?;
                attempt = Attempt::Retry;
                continue;
            }

            let headers = response.headers().clone();
            let bytes = response.bytes().await?;
            debug!(%url, status = status.as_u16(), len = bytes.len(), "response received");

            if !status.is_success() {
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }

            return Ok(ApiResponse {
                status,
                headers,
                body: bytes.to_vec(),
            });
        }
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        mut auth_header: HeaderValue,
        body: Option<&RequestBody>,
    ) -> Result<reqwest::Response, ApiError> {
        auth_header.set_sensitive(true);

        let mut request = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, auth_header)
            .header(ACCEPT, "application/json");

        request = match body {
            Some(RequestBody::Json(value)) => request.json(value),
            Some(RequestBody::Raw {
                content_type,
                bytes,
            }) => request
                .header(CONTENT_TYPE, content_type.as_str())
                .body(bytes.clone()),
            None => request,
        };

        Ok(request.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Scheme};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Provider that hands out `Bearer tok-N`, bumping N on each refresh.
    struct CountingProvider {
        refreshable: bool,
        generation: Mutex<usize>,
        refreshes: AtomicUsize,
        fail_refresh: bool,
    }

    impl CountingProvider {
        fn new(refreshable: bool) -> Self {
            Self {
                refreshable,
                generation: Mutex::new(0),
                refreshes: AtomicUsize::new(0),
                fail_refresh: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_refresh: true,
                ..Self::new(true)
            }
        }
    }

    #[async_trait::async_trait]
    impl AuthProvider for CountingProvider {
        async fn auth_header(&self) -> Result<HeaderValue, AuthError> {
            let n = *self.generation.lock().unwrap();
            Ok(HeaderValue::from_str(&format!("Bearer tok-{}", n)).unwrap())
        }

        async fn force_refresh(&self) -> Result<(), AuthError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh {
                return Err(AuthError::RefreshFailed {
                    status: 400,
                    body: "invalid_grant".into(),
                });
            }
            *self.generation.lock().unwrap() += 1;
            Ok(())
        }

        fn supports_refresh(&self) -> bool {
            self.refreshable
        }

        fn scheme(&self) -> Scheme {
            if self.refreshable {
                Scheme::OAuth
            } else {
                Scheme::Static
            }
        }
    }

    fn executor(server: &MockServer, provider: Arc<CountingProvider>) -> RequestExecutor {
        RequestExecutor::with_client(Client::new(), provider, server.uri())
    }

    #[tokio::test]
    async fn success_returns_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer tok-0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-oauth-scopes", "repository, account")
                    .set_body_json(serde_json::json!({"username": "dev"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = Arc::new(CountingProvider::new(true));
        let response = executor(&server, provider.clone())
            .execute(Method::GET, "/user", None)
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.header("x-oauth-scopes"), Some("repository, account"));
        let user: serde_json::Value = response.json().expect("json");
        assert_eq!(user["username"], "dev");
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unauthorized_then_ok_refreshes_once() {
        let server = MockServer::start().await;
        Mock::given(header("authorization", "Bearer tok-0"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(header("authorization", "Bearer tok-1"))
            .and(body_json(serde_json::json!({"title": "x"})))
            .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = Arc::new(CountingProvider::new(true));
        let body = RequestBody::Json(serde_json::json!({"title": "x"}));
        let response = executor(&server, provider.clone())
            .execute(Method::POST, "repositories/ws/repo/issues", Some(&body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_unauthorized_stops_after_one_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
            .expect(2)
            .mount(&server)
            .await;

        let provider = Arc::new(CountingProvider::new(true));
        let err = executor(&server, provider.clone())
            .execute(Method::GET, "/user", None)
            .await
            .unwrap_err();

        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn static_credentials_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let provider = Arc::new(CountingProvider::new(false));
        let err = executor(&server, provider.clone())
            .execute(Method::GET, "/user", None)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_as_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let provider = Arc::new(CountingProvider::failing());
        let err = executor(&server, provider)
            .execute(Method::GET, "/user", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApiError::Auth(AuthError::RefreshFailed { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn other_statuses_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = Arc::new(CountingProvider::new(true));
        let err = executor(&server, provider.clone())
            .execute(Method::DELETE, "/repositories/ws/repo", None)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(403));
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn timeout_is_a_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let provider: Arc<dyn AuthProvider> = Arc::new(CountingProvider::new(false));
        let executor = RequestExecutor::new(provider, server.uri(), Duration::from_millis(100))
            .expect("executor");
        let err = executor.execute(Method::GET, "/slow", None).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[tokio::test]
    async fn raw_bodies_keep_their_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "text/plain"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = Arc::new(CountingProvider::new(false));
        let body = RequestBody::Raw {
            content_type: "text/plain".into(),
            bytes: b"hello".to_vec(),
        };
        let response = executor(&server, provider)
            .execute(Method::POST, "/src", Some(&body))
            .await
            .expect("response");
        assert!(response.bytes().is_empty());
    }

    #[test]
    fn url_joins_paths_and_accepts_same_origin_links() {
        let provider: Arc<dyn AuthProvider> = Arc::new(CountingProvider::new(false));
        let executor =
            RequestExecutor::with_client(Client::new(), provider, "https://api.example.com/2.0/");
        assert_eq!(executor.api_base(), "https://api.example.com/2.0");
        assert_eq!(executor.url("/user").unwrap(), "https://api.example.com/2.0/user");
        assert_eq!(executor.url("user").unwrap(), "https://api.example.com/2.0/user");
        assert_eq!(
            executor
                .url("https://api.example.com/2.0/repositories?page=2")
                .unwrap(),
            "https://api.example.com/2.0/repositories?page=2"
        );
    }

    #[test]
    fn url_rejects_other_origins() {
        let provider: Arc<dyn AuthProvider> = Arc::new(CountingProvider::new(false));
        let executor =
            RequestExecutor::with_client(Client::new(), provider, "https://api.example.com/2.0");

        for foreign in [
            "https://evil.example.net/2.0/user",
            "http://api.example.com/2.0/user",
            "https://api.example.com:8443/2.0/user",
            "https://api.example.com.evil.net/2.0/user",
        ] {
            assert!(
                matches!(executor.url(foreign), Err(ApiError::InvalidRequest(_))),
                "{} accepted",
                foreign
            );
        }
    }

    #[tokio::test]
    async fn absolute_url_on_other_host_is_never_contacted() {
        let api = MockServer::start().await;
        let foreign = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&foreign)
            .await;

        let provider = Arc::new(CountingProvider::new(true));
        let err = executor(&api, provider)
            .execute(Method::GET, &format!("{}/collect", foreign.uri()), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }
}
