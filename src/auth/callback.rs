//! auth::callback
//!
//! Short-lived local HTTP listener that receives the OAuth redirect.
//!
//! # Design
//!
//! The listener binds `127.0.0.1:0`, serves only `GET /callback`, and runs on
//! its own task. The first request to `/callback` is validated against the
//! expected `state` and its outcome is sent over a one-shot channel; later
//! requests get an "already handled" page and are ignored.
//!
//! The server shuts down when [`CallbackServer::shutdown`] is awaited or when
//! the [`CallbackServer`] is dropped, so every exit path of the login flow
//! releases the port.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::errors::AuthError;

/// Path the provider redirects to.
pub const CALLBACK_PATH: &str = "/callback";

/// How long [`CallbackServer::shutdown`] waits for open connections to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<!doctype html><html><body>\
<h1>Authenticated!</h1><p>You can close this window and return to the terminal.</p>\
</body></html>";

const FAILURE_PAGE: &str = "<!doctype html><html><body>\
<h1>Authentication failed</h1><p>Return to the terminal for details.</p>\
</body></html>";

const HANDLED_PAGE: &str = "<!doctype html><html><body>\
<h1>Already handled</h1><p>This login attempt has already completed.</p>\
</body></html>";

/// What the redirect resolved to.
pub type CallbackOutcome = Result<String, AuthError>;

/// Shared state between the handler and the flow.
struct CallbackState {
    expected_state: String,
    sender: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
}

/// Running callback listener.
pub struct CallbackServer {
    addr: SocketAddr,
    outcome: Option<oneshot::Receiver<CallbackOutcome>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind `127.0.0.1` on an OS-assigned port and start serving.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Listener`] if the socket cannot be bound.
    pub async fn start(expected_state: String) -> Result<Self, AuthError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(|e| AuthError::Listener(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AuthError::Listener(e.to_string()))?;

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(CallbackState {
            expected_state,
            sender: Mutex::new(Some(outcome_tx)),
        });
        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(state);

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "OAuth callback listener stopped with an error");
            }
        });

        debug!(%addr, "OAuth callback listener started");
        Ok(Self {
            addr,
            outcome: Some(outcome_rx),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Redirect URI to register with the provider.
    pub fn redirect_uri(&self) -> String {
        format!("http://{}{}", self.addr, CALLBACK_PATH)
    }

    /// Take the receiver for the redirect outcome.
    ///
    /// Returns `None` if it was already taken.
    pub fn take_outcome(&mut self) -> Option<oneshot::Receiver<CallbackOutcome>> {
        self.outcome.take()
    }

    /// Stop accepting connections and wait for the listener task to exit.
    ///
    /// Once this returns the port is closed.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
                task.abort();
                let _ = task.await;
            }
        }
        debug!(addr = %self.addr, "OAuth callback listener stopped");
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for CallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackServer")
            .field("addr", &self.addr)
            .field("running", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

/// Classify the redirect query into an outcome.
fn evaluate(expected_state: &str, params: &HashMap<String, String>) -> CallbackOutcome {
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(AuthError::CsrfStateMismatch);
    }

    if let Some(error) = params.get("error") {
        return Err(AuthError::AuthorizationDenied {
            error: error.clone(),
            description: params.get("error_description").cloned(),
        });
    }

    match params.get("code").filter(|c| !c.is_empty()) {
        Some(code) => Ok(code.clone()),
        None => Err(AuthError::MissingAuthorizationCode),
    }
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let sender = match state.sender.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };

    let Some(sender) = sender else {
        debug!("ignoring OAuth redirect after the flow resolved");
        return (StatusCode::GONE, Html(HANDLED_PAGE));
    };

    let outcome = evaluate(&state.expected_state, &params);
    let response = match &outcome {
        Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE)),
        Err(e) => {
            debug!(error = %e, "OAuth redirect rejected");
            (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE))
        }
    };

    if sender.send(outcome).is_err() {
        debug!("OAuth flow stopped waiting before the redirect arrived");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn evaluate_accepts_matching_state() {
        let outcome = evaluate("s1", &params(&[("state", "s1"), ("code", "abc")]));
        assert_eq!(outcome.expect("code"), "abc");
    }

    #[test]
    fn evaluate_rejects_state_mismatch_before_anything_else() {
        let outcome = evaluate(
            "s1",
            &params(&[("state", "s2"), ("code", "abc"), ("error", "x")]),
        );
        assert!(matches!(outcome, Err(AuthError::CsrfStateMismatch)));

        let missing = evaluate("s1", &params(&[("code", "abc")]));
        assert!(matches!(missing, Err(AuthError::CsrfStateMismatch)));
    }

    #[test]
    fn evaluate_propagates_provider_error() {
        let outcome = evaluate(
            "s1",
            &params(&[
                ("state", "s1"),
                ("error", "access_denied"),
                ("error_description", "User said no"),
            ]),
        );
        match outcome {
            Err(AuthError::AuthorizationDenied { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description.as_deref(), Some("User said no"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn evaluate_requires_code() {
        let outcome = evaluate("s1", &params(&[("state", "s1"), ("code", "")]));
        assert!(matches!(outcome, Err(AuthError::MissingAuthorizationCode)));
    }

    #[tokio::test]
    async fn first_redirect_resolves_and_later_ones_are_ignored() {
        let mut server = CallbackServer::start("s1".to_string()).await.expect("start");
        let rx = server.take_outcome().expect("receiver");
        let url = server.redirect_uri();
        assert!(url.starts_with("http://127.0.0.1:"));
        assert!(url.ends_with("/callback"));

        let first = reqwest::get(format!("{}?state=s1&code=abc", url))
            .await
            .expect("first request");
        assert_eq!(first.status(), reqwest::StatusCode::OK);
        assert!(first.text().await.expect("body").contains("Authenticated!"));

        let second = reqwest::get(format!("{}?state=s1&code=other", url))
            .await
            .expect("second request");
        assert_eq!(second.status(), reqwest::StatusCode::GONE);

        assert_eq!(rx.await.expect("outcome").expect("code"), "abc");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn other_paths_are_not_served() {
        let server = CallbackServer::start("s1".to_string()).await.expect("start");
        let response = reqwest::get(format!("http://{}/other?state=s1&code=x", server.local_addr()))
            .await
            .expect("request");
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_the_port() {
        let server = CallbackServer::start("s1".to_string()).await.expect("start");
        let url = format!("{}?state=s1&code=abc", server.redirect_uri());
        server.shutdown().await;

        assert!(reqwest::get(url).await.is_err());
    }
}
