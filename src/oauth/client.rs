//! OAuth client credentials compiled into the binary

use crate::error::AppError;

pub const CLIENT_ID_PLACEHOLDER: &str = "YOUR_CLIENT_ID_HERE";
pub const CLIENT_SECRET_PLACEHOLDER: &str = "YOUR_CLIENT_SECRET_HERE";

/// Build-time default Google OAuth client
///
/// Values come from `BLOGGER_OAUTH_CLIENT_ID` / `BLOGGER_OAUTH_CLIENT_SECRET`
/// at compile time; placeholders stand in when they were not set.
#[derive(Clone, PartialEq, Eq)]
pub struct DefaultClient {
    client_id: String,
    client_secret: String,
}

impl std::fmt::Debug for DefaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultClient")
            .field("client_id", &self.client_id)
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl DefaultClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// The client compiled into this binary
    pub fn compiled() -> Self {
        Self::new(
            option_env!("BLOGGER_OAUTH_CLIENT_ID").unwrap_or(CLIENT_ID_PLACEHOLDER),
            option_env!("BLOGGER_OAUTH_CLIENT_SECRET").unwrap_or(CLIENT_SECRET_PLACEHOLDER),
        )
    }

    /// A client with only placeholders
    pub fn unset() -> Self {
        Self::new(CLIENT_ID_PLACEHOLDER, CLIENT_SECRET_PLACEHOLDER)
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
            && self.client_id != CLIENT_ID_PLACEHOLDER
            && !self.client_secret.is_empty()
            && self.client_secret != CLIENT_SECRET_PLACEHOLDER
    }

    pub fn client_id(&self) -> Result<&str, AppError> {
        match self.client_id.as_str() {
            CLIENT_ID_PLACEHOLDER => Err(AppError::Configuration(
                "OAuth Client ID not configured. Run `liveblog oauth set-client` to use your own Google OAuth client."
                    .to_string(),
            )),
            "" => Err(AppError::Configuration(
                "OAuth Client ID is empty in this build: BLOGGER_OAUTH_CLIENT_ID was set to an empty value at build time. \
                 Rebuild with a valid value or run `liveblog oauth set-client`."
                    .to_string(),
            )),
            id => Ok(id),
        }
    }

    pub fn client_secret(&self) -> Result<&str, AppError> {
        match self.client_secret.as_str() {
            CLIENT_SECRET_PLACEHOLDER => Err(AppError::Configuration(
                "OAuth Client Secret not configured. This is a build configuration issue: liveblog was built without \
                 valid OAuth credentials. Run `liveblog oauth set-client` or rebuild with BLOGGER_OAUTH_CLIENT_SECRET set."
                    .to_string(),
            )),
            "" => Err(AppError::Configuration(
                "OAuth Client Secret is empty in this build: BLOGGER_OAUTH_CLIENT_SECRET was set to an empty value at build time. \
                 Rebuild with a valid value or run `liveblog oauth set-client`."
                    .to_string(),
            )),
            secret => Ok(secret),
        }
    }
}
