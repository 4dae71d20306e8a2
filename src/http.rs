//! HTTP client utilities
//!
//! Provides a reqwest::Client configured with timeouts, and the helpers every
//! platform adapter uses to turn non-2xx responses into [`AppError`]s.
//! System proxy env vars (HTTP_PROXY, HTTPS_PROXY, NO_PROXY) are honored by reqwest itself.

use crate::config::Platform;
use crate::error::AppError;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a reqwest Client with the given timeout
pub fn client_with_timeout(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("liveblog/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Network(format!("Failed to create HTTP client: {}", e)))
}

/// Map a transport failure (no response received) to a network error
pub fn transport_error(err: reqwest::Error) -> AppError {
    AppError::Network(err.to_string())
}

/// Extract the first non-empty string found at one of the JSON pointers
pub fn error_message(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| body.pointer(p))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Pass through 2xx responses; anything else becomes a `PlatformApi` error
///
/// The message is taken from the platform's structured error body when one of
/// `pointers` matches, else the raw body, else the HTTP status text.
pub async fn expect_success(
    platform: Platform,
    resp: Response,
    pointers: &[&str],
) -> Result<Response, AppError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| error_message(&body, pointers))
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string()
        });

    Err(AppError::platform_api(platform, Some(status.as_u16()), message))
}

/// Decode a successful response body as JSON
pub async fn read_json<T: DeserializeOwned>(platform: Platform, resp: Response) -> Result<T, AppError> {
    let text = resp.text().await.map_err(transport_error)?;
    serde_json::from_str(&text)
        .map_err(|e| AppError::Parse(format!("Unexpected {} response: {}", platform, e)))
}
