//! Token lifecycle tests against a stub Google token endpoint

use super::google::*;
use super::DefaultClient;
use crate::error::AppError;
use crate::secrets::{MemoryStore, SecretStore};
use crate::test_support::{free_port, spawn_stub, Recorder};
use async_trait::async_trait;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct TokenStub {
    recorder: Recorder,
    status: StatusCode,
    body: Value,
}

async fn token_endpoint(
    State(stub): State<TokenStub>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    stub.recorder
        .record("/token", None, &headers, json!(form));
    (stub.status, Json(stub.body.clone()))
}

async fn token_server(status: StatusCode, body: Value) -> (String, Recorder) {
    let recorder = Recorder::new();
    let stub = TokenStub {
        recorder: recorder.clone(),
        status,
        body,
    };
    let router = Router::new()
        .route("/token", post(token_endpoint))
        .with_state(stub);
    (spawn_stub(router).await, recorder)
}

/// Prompt that never completes the sign-in
struct IgnoredPrompt;

#[async_trait]
impl ConsentPrompt for IgnoredPrompt {
    async fn present(&self, _url: &str) -> Result<(), AppError> {
        Ok(())
    }
}

/// Prompt that fails, standing in for a user who cannot sign in
struct FailingPrompt;

#[async_trait]
impl ConsentPrompt for FailingPrompt {
    async fn present(&self, _url: &str) -> Result<(), AppError> {
        Err(AppError::Authentication("no browser available".to_string()))
    }
}

/// Prompt that follows the redirect like a browser would after consent
struct RedirectingPrompt {
    code: String,
    forged_state: Option<String>,
}

#[async_trait]
impl ConsentPrompt for RedirectingPrompt {
    async fn present(&self, url: &str) -> Result<(), AppError> {
        let parsed = url::Url::parse(url).unwrap();
        let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["scope"], BLOGGER_SCOPE);

        let state = self
            .forged_state
            .clone()
            .unwrap_or_else(|| params["state"].clone());
        let callback = format!(
            "{}?code={}&state={}",
            params["redirect_uri"].replace("localhost", "127.0.0.1"),
            self.code,
            state
        );
        tokio::spawn(async move {
            let _ = reqwest::get(callback).await;
        });
        Ok(())
    }
}

fn manager(
    store: Arc<MemoryStore>,
    token_base: &str,
    prompt: Arc<dyn ConsentPrompt>,
    default_client: DefaultClient,
) -> GoogleOAuth {
    GoogleOAuth::new(store, reqwest::Client::new(), default_client, prompt).with_settings(
        OAuthSettings {
            authorize_url: "https://accounts.example.test/auth".to_string(),
            token_url: format!("{}/token", token_base),
            callback_port: free_port(),
            callback_timeout: Duration::from_secs(5),
            ..OAuthSettings::default()
        },
    )
}

fn test_client() -> DefaultClient {
    DefaultClient::new("test-client-id", "test-client-secret")
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn seed_tokens(store: &MemoryStore, expiry_ms: i64, refresh: Option<&str>) {
    store.store(TOKEN_KEY, "cached-token").await.unwrap();
    store
        .store(TOKEN_EXPIRY_KEY, &expiry_ms.to_string())
        .await
        .unwrap();
    if let Some(refresh) = refresh {
        store.store(REFRESH_TOKEN_KEY, refresh).await.unwrap();
    }
}

#[tokio::test]
async fn test_fresh_cached_token_needs_no_network() {
    let (base, recorder) = token_server(StatusCode::OK, json!({})).await;
    let store = Arc::new(MemoryStore::new());
    seed_tokens(&store, now_ms() + 3_600_000, Some("r1")).await;

    let oauth = manager(store, &base, Arc::new(FailingPrompt), test_client());
    assert_eq!(oauth.authenticate().await.unwrap(), "cached-token");
    assert_eq!(recorder.calls(), 0);
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_once() {
    let (base, recorder) = token_server(
        StatusCode::OK,
        json!({"access_token": "fresh-token", "expires_in": 3600, "token_type": "Bearer"}),
    )
    .await;
    let store = Arc::new(MemoryStore::new());
    seed_tokens(&store, now_ms() + 60_000, Some("r1")).await;

    let oauth = manager(store.clone(), &base, Arc::new(FailingPrompt), test_client());
    assert_eq!(oauth.authenticate().await.unwrap(), "fresh-token");
    assert_eq!(recorder.calls(), 1);

    let form = recorder.last().body;
    assert_eq!(form["grant_type"], "refresh_token");
    assert_eq!(form["refresh_token"], "r1");
    assert_eq!(form["client_id"], "test-client-id");

    // The refresh response carried no refresh token, so the old one stays
    assert_eq!(
        store.get(REFRESH_TOKEN_KEY).await.unwrap().as_deref(),
        Some("r1")
    );
    let expiry: i64 = store
        .get(TOKEN_EXPIRY_KEY)
        .await
        .unwrap()
        .unwrap()
        .parse()
        .unwrap();
    assert!(expiry > now_ms() + 3_500_000);

    // Second call hits the cache
    assert_eq!(oauth.authenticate().await.unwrap(), "fresh-token");
    assert_eq!(recorder.calls(), 1);
}

#[tokio::test]
async fn test_invalid_grant_clears_all_token_keys() {
    let (base, recorder) = token_server(
        StatusCode::BAD_REQUEST,
        json!({"error": "invalid_grant", "error_description": "Token has been expired or revoked."}),
    )
    .await;
    let store = Arc::new(MemoryStore::new());
    seed_tokens(&store, now_ms() - 1_000, Some("dead")).await;

    let oauth = manager(store.clone(), &base, Arc::new(FailingPrompt), test_client());
    let err = oauth.refresh_access_token("dead").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to refresh token: Token has been expired or revoked."
    );
    assert_eq!(recorder.calls(), 1);
    assert!(!store.contains(TOKEN_KEY));
    assert!(!store.contains(REFRESH_TOKEN_KEY));
    assert!(!store.contains(TOKEN_EXPIRY_KEY));
}

#[tokio::test]
async fn test_failed_refresh_falls_through_to_sign_in() {
    let (base, _) = token_server(StatusCode::BAD_REQUEST, json!({"error": "invalid_grant"})).await;
    let store = Arc::new(MemoryStore::new());
    seed_tokens(&store, now_ms() + 10_000, Some("dead")).await;

    let oauth = manager(store.clone(), &base, Arc::new(FailingPrompt), test_client());
    let err = oauth.authenticate().await.unwrap_err();
    assert_eq!(err.to_string(), "no browser available");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_transient_refresh_error_keeps_tokens() {
    let (base, _) = token_server(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": "backend_error"}),
    )
    .await;
    let store = Arc::new(MemoryStore::new());
    seed_tokens(&store, now_ms(), Some("r1")).await;

    let oauth = manager(store.clone(), &base, Arc::new(FailingPrompt), test_client());
    assert!(oauth.refresh_access_token("r1").await.is_err());
    assert!(store.contains(REFRESH_TOKEN_KEY));
}

#[tokio::test]
async fn test_corrupted_expiry_is_not_a_cached_token() {
    let store = Arc::new(MemoryStore::new());
    store.store(TOKEN_KEY, "t").await.unwrap();
    store.store(TOKEN_EXPIRY_KEY, "soon").await.unwrap();

    let oauth = manager(store, "http://127.0.0.1:9", Arc::new(FailingPrompt), test_client());
    assert!(!oauth.is_authenticated().await);
}

#[tokio::test]
async fn test_extreme_expiry_values_do_not_overflow() {
    let store = Arc::new(MemoryStore::new());
    seed_tokens(&store, i64::MIN, None).await;
    let oauth = manager(store.clone(), "http://127.0.0.1:9", Arc::new(FailingPrompt), test_client());
    assert!(!oauth.is_authenticated().await);

    let (base, _) = token_server(
        StatusCode::OK,
        json!({"access_token": "long-lived", "expires_in": i64::MAX}),
    )
    .await;
    let oauth = manager(store.clone(), &base, Arc::new(FailingPrompt), test_client());
    assert_eq!(oauth.refresh_access_token("r1").await.unwrap(), "long-lived");
    assert_eq!(
        store.get(TOKEN_EXPIRY_KEY).await.unwrap().as_deref(),
        Some(i64::MAX.to_string().as_str())
    );
    assert_eq!(oauth.authenticate().await.unwrap(), "long-lived");
}

#[tokio::test]
async fn test_custom_client_overrides_and_restores_default() {
    let store = Arc::new(MemoryStore::new());
    let oauth = manager(store, "http://127.0.0.1:9", Arc::new(FailingPrompt), test_client());

    assert!(!oauth.is_using_custom_credentials().await.unwrap());
    oauth
        .set_custom_client_credentials("custom-id", "custom-secret")
        .await
        .unwrap();
    assert!(oauth.is_using_custom_credentials().await.unwrap());
    assert_eq!(oauth.client_id().await.unwrap(), "custom-id");
    assert_eq!(oauth.client_secret().await.unwrap(), "custom-secret");

    oauth.clear_custom_client_credentials().await.unwrap();
    assert_eq!(oauth.client_id().await.unwrap(), "test-client-id");
    assert_eq!(oauth.client_secret().await.unwrap(), "test-client-secret");
}

#[tokio::test]
async fn test_clearing_custom_client_without_default_is_configuration_error() {
    let store = Arc::new(MemoryStore::new());
    let oauth = manager(
        store,
        "http://127.0.0.1:9",
        Arc::new(FailingPrompt),
        DefaultClient::unset(),
    );
    assert!(!oauth.has_default_credentials());

    oauth.set_custom_client_credentials("id", "secret").await.unwrap();
    assert_eq!(oauth.client_id().await.unwrap(), "id");

    oauth.clear_custom_client_credentials().await.unwrap();
    assert!(matches!(
        oauth.client_id().await,
        Err(AppError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_switching_client_signs_out() {
    let store = Arc::new(MemoryStore::new());
    seed_tokens(&store, now_ms() + 3_600_000, Some("r1")).await;
    let oauth = manager(store.clone(), "http://127.0.0.1:9", Arc::new(FailingPrompt), test_client());

    oauth.use_client(Some(("id", "secret"))).await.unwrap();
    assert!(!store.contains(TOKEN_KEY));
    assert!(store.contains(CUSTOM_CLIENT_ID_KEY));

    let status = oauth.status().await.unwrap();
    assert!(!status.authenticated);
    assert!(status.using_custom_client);
    assert!(status.default_client_available);
}

#[tokio::test]
async fn test_interactive_flow_exchanges_code() {
    let (base, recorder) = token_server(
        StatusCode::OK,
        json!({"access_token": "new-access", "refresh_token": "new-refresh", "expires_in": 3599}),
    )
    .await;
    let store = Arc::new(MemoryStore::new());
    let prompt = Arc::new(RedirectingPrompt {
        code: "auth-code".to_string(),
        forged_state: None,
    });
    let oauth = manager(store.clone(), &base, prompt, test_client());

    assert_eq!(oauth.authenticate().await.unwrap(), "new-access");

    let form = recorder.last().body;
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["code"], "auth-code");
    assert_eq!(form["code_verifier"].as_str().unwrap().len(), 43);
    assert!(form["redirect_uri"]
        .as_str()
        .unwrap()
        .starts_with("http://localhost:"));
    assert_eq!(
        store.get(REFRESH_TOKEN_KEY).await.unwrap().as_deref(),
        Some("new-refresh")
    );
}

#[tokio::test]
async fn test_state_mismatch_never_exchanges() {
    let (base, recorder) = token_server(StatusCode::OK, json!({"access_token": "x"})).await;
    let store = Arc::new(MemoryStore::new());
    let prompt = Arc::new(RedirectingPrompt {
        code: "auth-code".to_string(),
        forged_state: Some("forged".to_string()),
    });
    let oauth = manager(store.clone(), &base, prompt, test_client());

    let err = oauth.authenticate().await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid state parameter");
    assert_eq!(recorder.calls(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_exchange_failure_is_reported() {
    let (base, _) = token_server(
        StatusCode::BAD_REQUEST,
        json!({"error": "invalid_request", "error_description": "Missing code verifier."}),
    )
    .await;
    let prompt = Arc::new(RedirectingPrompt {
        code: "auth-code".to_string(),
        forged_state: None,
    });
    let oauth = manager(Arc::new(MemoryStore::new()), &base, prompt, test_client());

    let err = oauth.authenticate().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to exchange authorization code: Missing code verifier."
    );
}

#[tokio::test]
async fn test_second_sign_in_is_rejected_while_first_is_pending() {
    let store = Arc::new(MemoryStore::new());
    let oauth = Arc::new(
        GoogleOAuth::new(
            store,
            reqwest::Client::new(),
            test_client(),
            Arc::new(IgnoredPrompt),
        )
        .with_settings(OAuthSettings {
            callback_port: free_port(),
            callback_timeout: Duration::from_millis(500),
            token_url: "http://127.0.0.1:9/token".to_string(),
            ..OAuthSettings::default()
        }),
    );

    let first = {
        let oauth = oauth.clone();
        tokio::spawn(async move { oauth.authenticate().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = oauth.authenticate().await.unwrap_err();
    assert!(err.to_string().contains("already in progress"));

    let err = first.await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "Authentication timeout");
}

#[tokio::test]
async fn test_missing_client_fails_before_binding() {
    let port = free_port();
    let oauth = GoogleOAuth::new(
        Arc::new(MemoryStore::new()),
        reqwest::Client::new(),
        DefaultClient::unset(),
        Arc::new(IgnoredPrompt),
    )
    .with_settings(OAuthSettings {
        callback_port: port,
        ..OAuthSettings::default()
    });

    // Hold the port: a bind attempt would surface as a different error
    let _held = std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
    assert!(matches!(
        oauth.authenticate().await,
        Err(AppError::Configuration(_))
    ));
}
