//! Error types shared by the token manager, the platform adapters and the router

use crate::config::Platform;
use serde::Serialize;
use thiserror::Error;

/// Application error taxonomy
///
/// Every failure surfaces to the user as a single human-readable message.
/// `Configuration` and `FormatMismatch` are raised before any network call;
/// `PlatformApi` messages are passed through from the platform with its name
/// as prefix.
#[derive(Debug, Error, Serialize)]
pub enum AppError {
    /// Missing blog fields, OAuth client credentials or adapter credentials
    #[error("{0}")]
    Configuration(String),

    /// OAuth consent denial, state mismatch, timeout, token exchange or refresh failure
    #[error("{0}")]
    Authentication(String),

    /// Non-2xx response or structured error body from a publishing platform
    #[error("{platform} API error: {message}")]
    PlatformApi {
        platform: Platform,
        status: Option<u16>,
        message: String,
    },

    /// Authoring format incompatible with the target platform
    #[error("{0}")]
    FormatMismatch(String),

    /// Transport failure: no response was received
    #[error("Network error: {0}")]
    Network(String),

    /// A response arrived but could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Locally detected bad input (malformed id, key or argument)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Secret store or settings file failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AppError {
    /// Stable snake_case code for the error kind
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "configuration",
            AppError::Authentication(_) => "authentication",
            AppError::PlatformApi { .. } => "platform_api",
            AppError::FormatMismatch(_) => "format_mismatch",
            AppError::Network(_) => "network",
            AppError::Parse(_) => "parse",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Storage(_) => "storage",
        }
    }

    /// Process exit code used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::InvalidInput(_) | AppError::FormatMismatch(_) => 1,
            AppError::Network(_) | AppError::PlatformApi { .. } | AppError::Parse(_) => 2,
            AppError::Configuration(_) => 3,
            AppError::Authentication(_) => 4,
            AppError::Storage(_) => 5,
        }
    }

    pub fn platform_api(platform: Platform, status: Option<u16>, message: impl Into<String>) -> Self {
        AppError::PlatformApi {
            platform,
            status,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_api_message_is_prefixed() {
        let err = AppError::platform_api(Platform::DevTo, Some(422), "Title can't be blank");
        assert_eq!(err.to_string(), "Dev.to API error: Title can't be blank");
        assert_eq!(err.error_code(), "platform_api");
    }

    #[test]
    fn test_configuration_message_is_verbatim() {
        let err = AppError::Configuration("Ghost site URL is not configured".to_string());
        assert_eq!(err.to_string(), "Ghost site URL is not configured");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_exit_codes_are_distinct_per_family() {
        assert_eq!(AppError::FormatMismatch(String::new()).exit_code(), 1);
        assert_eq!(AppError::Network(String::new()).exit_code(), 2);
        assert_eq!(AppError::Authentication(String::new()).exit_code(), 4);
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AppError = io.into();
        assert_eq!(err.error_code(), "storage");
    }
}
