//! Google OAuth token manager for the Blogger API
//!
//! Produces a valid access token by checking the cached token set, silently
//! refreshing it when it is about to expire, and otherwise running the
//! interactive authorization-code + PKCE flow through a loopback listener.

use super::callback_server::CallbackServer;
use super::client::DefaultClient;
use super::pkce::{generate_state, PkcePair};
use crate::error::AppError;
use crate::secrets::SecretStore;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

pub const TOKEN_KEY: &str = "blogger.token";
pub const REFRESH_TOKEN_KEY: &str = "blogger.refreshToken";
pub const TOKEN_EXPIRY_KEY: &str = "blogger.tokenExpiry";
pub const CUSTOM_CLIENT_ID_KEY: &str = "blogger.customClientId";
pub const CUSTOM_CLIENT_SECRET_KEY: &str = "blogger.customClientSecret";

pub const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const BLOGGER_SCOPE: &str = "https://www.googleapis.com/auth/blogger";
pub const CALLBACK_PORT: u16 = 54321;

/// Endpoints and timings of the flow
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub authorize_url: String,
    pub token_url: String,
    pub scope: String,
    pub callback_port: u16,
    pub callback_timeout: Duration,
    /// Tokens expiring within this margin are refreshed first
    pub refresh_margin: Duration,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            scope: BLOGGER_SCOPE.to_string(),
            callback_port: CALLBACK_PORT,
            callback_timeout: Duration::from_secs(300),
            refresh_margin: Duration::from_millis(300_000),
        }
    }
}

/// Shows the authorization URL to the user
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    async fn present(&self, authorize_url: &str) -> Result<(), AppError>;
}

/// Opens the system browser, printing the URL when that fails
pub struct SystemBrowser;

#[async_trait]
impl ConsentPrompt for SystemBrowser {
    async fn present(&self, authorize_url: &str) -> Result<(), AppError> {
        if webbrowser::open(authorize_url).is_ok() {
            info!("Browser opened for Google sign-in");
        } else {
            eprintln!(
                "Please visit this URL in your browser to sign in:\n{}",
                authorize_url
            );
        }
        Ok(())
    }
}

/// Anything that can hand out a Blogger access token
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AppError>;

    async fn is_authenticated(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenErrorBody {
    /// `error_description`, else `error`
    fn message(&self) -> Option<String> {
        self.error_description
            .clone()
            .filter(|d| !d.is_empty())
            .or_else(|| self.error.clone())
    }
}

/// Snapshot for `liveblog oauth status`
#[derive(Debug, Clone, Serialize)]
pub struct OAuthStatus {
    pub authenticated: bool,
    pub using_custom_client: bool,
    pub default_client_available: bool,
    pub token_expires_at: Option<DateTime<Utc>>,
}

pub struct GoogleOAuth {
    secrets: Arc<dyn SecretStore>,
    http: Client,
    settings: OAuthSettings,
    default_client: DefaultClient,
    prompt: Arc<dyn ConsentPrompt>,
    flow_lock: Mutex<()>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl GoogleOAuth {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        http: Client,
        default_client: DefaultClient,
        prompt: Arc<dyn ConsentPrompt>,
    ) -> Self {
        Self {
            secrets,
            http,
            settings: OAuthSettings::default(),
            default_client,
            prompt,
            flow_lock: Mutex::new(()),
        }
    }

    pub fn with_settings(mut self, settings: OAuthSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Return a valid access token, refreshing or signing in as needed
    pub async fn authenticate(&self) -> Result<String, AppError> {
        if let Some(token) = self.cached_token().await? {
            return Ok(token);
        }
        self.interactive_flow().await
    }

    /// Cached token if still valid, else the result of a silent refresh
    async fn cached_token(&self) -> Result<Option<String>, AppError> {
        let token = self.non_empty(TOKEN_KEY).await?;
        let expiry = self.non_empty(TOKEN_EXPIRY_KEY).await?;
        let (Some(token), Some(expiry)) = (token, expiry) else {
            debug!("No cached Google token");
            return Ok(None);
        };

        let Ok(expiry) = expiry.trim().parse::<i64>() else {
            warn!("Stored token expiry is corrupted, ignoring cached token");
            return Ok(None);
        };

        let margin = i64::try_from(self.settings.refresh_margin.as_millis()).unwrap_or(i64::MAX);
        if now_ms() < expiry.saturating_sub(margin) {
            debug!("Using cached Google token");
            return Ok(Some(token));
        }

        let Some(refresh_token) = self.non_empty(REFRESH_TOKEN_KEY).await? else {
            debug!("Cached Google token expired and no refresh token is stored");
            return Ok(None);
        };

        match self.refresh_access_token(&refresh_token).await {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!("Silent token refresh failed: {}", e);
                Ok(None)
            }
        }
    }

    async fn non_empty(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.secrets.get(key).await?.filter(|v| !v.is_empty()))
    }

    async fn interactive_flow(&self) -> Result<String, AppError> {
        let _flow = self.flow_lock.try_lock().map_err(|_| {
            AppError::Authentication(
                "Another sign-in is already in progress. Finish it in the browser or wait for it to time out."
                    .to_string(),
            )
        })?;

        // Resolve the client before opening a port or a browser
        let client_id = self.client_id().await?;
        self.client_secret().await?;

        let pkce = PkcePair::generate();
        let state = generate_state();

        let server = CallbackServer::bind(self.settings.callback_port).await?;
        let redirect_uri = server.redirect_uri();
        let authorize_url = self.authorize_url(&client_id, &redirect_uri, &state, &pkce.challenge)?;

        info!("Starting Google sign-in");
        self.prompt.present(&authorize_url).await?;

        let code = server
            .wait_for_code(state, self.settings.callback_timeout)
            .await?;

        info!("Authorization code received, exchanging for tokens");
        let tokens = self.exchange_code(&code, &pkce.verifier, &redirect_uri).await?;
        self.store_tokens(&tokens).await?;
        info!("Signed in to Google");
        Ok(tokens.access_token)
    }

    fn authorize_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
        challenge: &str,
    ) -> Result<String, AppError> {
        let url = Url::parse_with_params(
            &self.settings.authorize_url,
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", self.settings.scope.as_str()),
                ("state", state),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("code_challenge", challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| AppError::Configuration(format!("Invalid authorization URL: {}", e)))?;
        Ok(url.into())
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, (Option<TokenErrorBody>, String)> {
        let resp = self
            .http
            .post(&self.settings.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| (None, e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| (None, e.to_string()))?;
        if !status.is_success() {
            let body: TokenErrorBody = serde_json::from_str(&text).unwrap_or_default();
            let message = body
                .message()
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err((Some(body), message));
        }

        serde_json::from_str(&text).map_err(|e| (None, format!("invalid token response: {}", e)))
    }

    async fn exchange_code(&self, code: &str, verifier: &str, redirect_uri: &str) -> Result<TokenResponse, AppError> {
        let client_id = self.client_id().await?;
        let client_secret = self.client_secret().await?;

        self.post_token_form(&[
            ("code", code),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
            ("code_verifier", verifier),
        ])
        .await
        .map_err(|(_, msg)| {
            AppError::Authentication(format!("Failed to exchange authorization code: {}", msg))
        })
    }

    /// Exchange a refresh token for a new access token
    ///
    /// A provider answer of `invalid_grant`, or any message mentioning an
    /// invalid or revoked token, clears the stored token set so the next
    /// `authenticate()` starts a fresh sign-in.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AppError> {
        let client_id = self.client_id().await?;
        let client_secret = self.client_secret().await?;

        debug!("Refreshing Google access token");
        let result = self
            .post_token_form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await;

        match result {
            Ok(tokens) => {
                self.store_tokens(&tokens).await?;
                info!("Google access token refreshed");
                Ok(tokens.access_token)
            }
            Err((body, message)) => {
                if let Some(body) = body {
                    let lowered = message.to_lowercase();
                    if body.error.as_deref() == Some("invalid_grant")
                        || lowered.contains("invalid")
                        || lowered.contains("revoked")
                    {
                        warn!("Refresh token rejected, clearing stored Google tokens");
                        self.clear_authentication().await?;
                    }
                }
                Err(AppError::Authentication(format!(
                    "Failed to refresh token: {}",
                    message
                )))
            }
        }
    }

    async fn store_tokens(&self, tokens: &TokenResponse) -> Result<(), AppError> {
        self.secrets.store(TOKEN_KEY, &tokens.access_token).await?;
        if let Some(refresh) = tokens.refresh_token.as_deref().filter(|r| !r.is_empty()) {
            self.secrets.store(REFRESH_TOKEN_KEY, refresh).await?;
        }
        let expiry = now_ms().saturating_add(tokens.expires_in.saturating_mul(1000));
        self.secrets
            .store(TOKEN_EXPIRY_KEY, &expiry.to_string())
            .await?;
        debug!("Stored Google tokens, expiry {}", expiry);
        Ok(())
    }

    /// Delete the access token, refresh token and expiry
    pub async fn clear_authentication(&self) -> Result<(), AppError> {
        for key in [TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY] {
            self.secrets.delete(key).await?;
        }
        Ok(())
    }

    /// True when a cached token is valid or could be refreshed
    pub async fn is_authenticated(&self) -> bool {
        match self.cached_token().await {
            Ok(token) => token.is_some(),
            Err(e) => {
                warn!("Failed to read cached Google token: {}", e);
                false
            }
        }
    }

    pub async fn set_custom_client_credentials(&self, client_id: &str, client_secret: &str) -> Result<(), AppError> {
        let (client_id, client_secret) = (client_id.trim(), client_secret.trim());
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(AppError::InvalidInput(
                "Both client ID and client secret are required".to_string(),
            ));
        }
        self.secrets.store(CUSTOM_CLIENT_ID_KEY, client_id).await?;
        self.secrets
            .store(CUSTOM_CLIENT_SECRET_KEY, client_secret)
            .await
    }

    pub async fn clear_custom_client_credentials(&self) -> Result<(), AppError> {
        self.secrets.delete(CUSTOM_CLIENT_ID_KEY).await?;
        self.secrets.delete(CUSTOM_CLIENT_SECRET_KEY).await
    }

    /// Switch to a custom client (or back to the default) and sign out
    ///
    /// Tokens are bound to the client that minted them.
    pub async fn use_client(&self, custom: Option<(&str, &str)>) -> Result<(), AppError> {
        match custom {
            Some((id, secret)) => self.set_custom_client_credentials(id, secret).await?,
            None => self.clear_custom_client_credentials().await?,
        }
        self.clear_authentication().await
    }

    pub async fn is_using_custom_credentials(&self) -> Result<bool, AppError> {
        Ok(self.non_empty(CUSTOM_CLIENT_ID_KEY).await?.is_some())
    }

    pub fn has_default_credentials(&self) -> bool {
        self.default_client.is_configured()
    }

    /// Custom client ID when set, else the build-time default
    pub async fn client_id(&self) -> Result<String, AppError> {
        match self.non_empty(CUSTOM_CLIENT_ID_KEY).await? {
            Some(id) => Ok(id),
            None => self.default_client.client_id().map(str::to_string),
        }
    }

    /// Custom client secret when set, else the build-time default
    pub async fn client_secret(&self) -> Result<String, AppError> {
        match self.non_empty(CUSTOM_CLIENT_SECRET_KEY).await? {
            Some(secret) => Ok(secret),
            None => self.default_client.client_secret().map(str::to_string),
        }
    }

    pub async fn status(&self) -> Result<OAuthStatus, AppError> {
        let authenticated = self.is_authenticated().await;
        let token_expires_at = self
            .non_empty(TOKEN_EXPIRY_KEY)
            .await?
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Ok(OAuthStatus {
            authenticated,
            using_custom_client: self.is_using_custom_credentials().await?,
            default_client_available: self.has_default_credentials(),
            token_expires_at,
        })
    }
}

#[async_trait]
impl AccessTokenSource for GoogleOAuth {
    async fn access_token(&self) -> Result<String, AppError> {
        self.authenticate().await
    }

    async fn is_authenticated(&self) -> bool {
        GoogleOAuth::is_authenticated(self).await
    }
}
