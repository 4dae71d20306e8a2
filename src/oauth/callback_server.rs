//! Loopback HTTP listener for the OAuth redirect
//!
//! Bound before the browser opens, serves exactly one `/callback` outcome and
//! is shut down on every exit path (success, provider error, state mismatch,
//! missing code, timeout).

use crate::error::AppError;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

/// Query parameters Google appends to the redirect
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

type CallbackOutcome = Result<String, AppError>;

struct CallbackState {
    expected_state: String,
    tx: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
}

impl CallbackState {
    fn deliver(&self, outcome: CallbackOutcome) {
        if let Ok(mut slot) = self.tx.lock() {
            if let Some(tx) = slot.take() {
                let _ = tx.send(outcome);
            }
        }
    }
}

/// Build the callback router; the receiver yields the first outcome only
pub fn callback_router(expected_state: String) -> (Router, oneshot::Receiver<CallbackOutcome>) {
    let (tx, rx) = oneshot::channel();
    let state = Arc::new(CallbackState {
        expected_state,
        tx: Mutex::new(Some(tx)),
    });

    let router = Router::new()
        .route("/callback", get(handle_callback))
        .fallback(|| async { (StatusCode::NOT_FOUND, Html(page("Not found", ""))) })
        .with_state(state);

    (router, rx)
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<String>) {
    if let Some(error) = params.error {
        debug!("OAuth provider returned error: {}", error);
        state.deliver(Err(AppError::Authentication(format!("OAuth error: {}", error))));
        return (
            StatusCode::BAD_REQUEST,
            Html(page(
                "Authentication failed",
                "The sign-in was not completed. You can close this window.",
            )),
        );
    }

    if params.state.as_deref() != Some(state.expected_state.as_str()) {
        state.deliver(Err(AppError::Authentication(
            "Invalid state parameter".to_string(),
        )));
        return (
            StatusCode::BAD_REQUEST,
            Html(page(
                "Authentication failed",
                "Invalid state parameter. Please try signing in again.",
            )),
        );
    }

    match params.code.filter(|c| !c.is_empty()) {
        Some(code) => {
            state.deliver(Ok(code));
            (
                StatusCode::OK,
                Html(page(
                    "Authentication successful",
                    "You can close this window and return to liveblog.",
                )),
            )
        }
        None => {
            state.deliver(Err(AppError::Authentication(
                "No authorization code received".to_string(),
            )));
            (
                StatusCode::BAD_REQUEST,
                Html(page(
                    "Authentication failed",
                    "No authorization code was received.",
                )),
            )
        }
    }
}

fn page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"><title>{title}</title></head>\n\
         <body style=\"font-family: sans-serif; text-align: center; padding-top: 4rem;\">\n\
         <h1>{title}</h1>\n<p>{message}</p>\n</body>\n</html>"
    )
}

/// Aborts the server task if the waiting future is dropped
struct ServerGuard(AbortHandle);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A bound loopback listener waiting to be served
pub struct CallbackServer {
    listener: tokio::net::TcpListener,
    addr: SocketAddr,
}

impl CallbackServer {
    /// Bind the loopback port
    pub async fn bind(port: u16) -> Result<Self, AppError> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| {
                AppError::Authentication(format!("Failed to start OAuth callback server: {}", e))
            })?;
        let addr = listener.local_addr()?;
        debug!("OAuth callback server listening on {}", addr);
        Ok(Self { listener, addr })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.port())
    }

    /// Serve until the first callback arrives or `timeout` elapses
    pub async fn wait_for_code(self, expected_state: String, timeout: Duration) -> Result<String, AppError> {
        let Self { listener, addr } = self;
        let (router, rx) = callback_router(expected_state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        let _guard = ServerGuard(server.abort_handle());

        let outcome = tokio::select! {
            received = rx => received.unwrap_or_else(|_| {
                Err(AppError::Authentication("OAuth callback server stopped unexpectedly".to_string()))
            }),
            _ = tokio::time::sleep(timeout) => {
                Err(AppError::Authentication("Authentication timeout".to_string()))
            }
        };

        // Let the response page flush before the listener goes away
        let _ = shutdown_tx.send(());
        let _ = tokio::time::timeout(Duration::from_secs(2), &mut server).await;
        debug!("OAuth callback server on {} closed", addr);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn call(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_valid_callback_delivers_code() {
        let (router, rx) = callback_router("s1".to_string());
        assert_eq!(call(router, "/callback?code=abc&state=s1").await, StatusCode::OK);
        assert_eq!(rx.await.unwrap().unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_state_mismatch_rejects() {
        let (router, rx) = callback_router("expected".to_string());
        assert_eq!(
            call(router, "/callback?code=abc&state=forged").await,
            StatusCode::BAD_REQUEST
        );
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Invalid state parameter");
    }

    #[tokio::test]
    async fn test_provider_error_rejects() {
        let (router, rx) = callback_router("s".to_string());
        assert_eq!(
            call(router, "/callback?error=access_denied&state=s").await,
            StatusCode::BAD_REQUEST
        );
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "OAuth error: access_denied");
    }

    #[tokio::test]
    async fn test_missing_code_rejects() {
        let (router, rx) = callback_router("s".to_string());
        assert_eq!(call(router, "/callback?state=s").await, StatusCode::BAD_REQUEST);
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "No authorization code received");
    }

    #[tokio::test]
    async fn test_other_paths_are_not_found() {
        let (router, mut rx) = callback_router("s".to_string());
        assert_eq!(call(router, "/favicon.ico").await, StatusCode::NOT_FOUND);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_only_first_callback_counts() {
        let (router, rx) = callback_router("s".to_string());
        call(router.clone(), "/callback?code=first&state=s").await;
        call(router, "/callback?code=second&state=s").await;
        assert_eq!(rx.await.unwrap().unwrap(), "first");
    }

    #[tokio::test]
    async fn test_timeout_rejects_and_releases_port() {
        let server = CallbackServer::bind(0).await.unwrap();
        let port = server.port();
        let err = server
            .wait_for_code("s".to_string(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Authentication timeout");

        // The port can be bound again once the listener is closed
        CallbackServer::bind(port).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = CallbackServer::bind(0).await.unwrap();
        let err = CallbackServer::bind(first.port()).await.err().unwrap();
        assert!(err
            .to_string()
            .starts_with("Failed to start OAuth callback server:"));
    }
}
