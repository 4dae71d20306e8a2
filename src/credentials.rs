//! Per-blog credentials kept in the secret store
//!
//! Every credential lives under `{platform}.{blog}.{kind}`. Blogger has no
//! per-blog credential: it uses the global OAuth token set owned by
//! [`crate::oauth::GoogleOAuth`].

use crate::config::Platform;
use crate::error::AppError;
use crate::platforms::ghost::GhostAdminKey;
use crate::secrets::SecretStore;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Kind suffix of a credential key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Password,
    ApiKey,
    Email,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Password => "password",
            CredentialKind::ApiKey => "apikey",
            CredentialKind::Email => "email",
        }
    }

    /// Kinds a platform may store, in migration order
    pub fn for_platform(platform: Platform) -> &'static [CredentialKind] {
        match platform {
            Platform::WordPress => &[CredentialKind::Password],
            Platform::Ghost | Platform::DevTo => &[CredentialKind::ApiKey],
            Platform::Substack => &[
                CredentialKind::Email,
                CredentialKind::Password,
                CredentialKind::ApiKey,
            ],
            Platform::Blogger => &[],
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the composite secret key for a blog credential
pub fn secret_key(platform: Platform, blog_name: &str, kind: CredentialKind) -> String {
    format!("{}.{}.{}", platform.key(), blog_name, kind)
}

/// How a Substack session is obtained
#[derive(Clone, PartialEq, Eq)]
pub enum SubstackAuth {
    /// Existing `connect.sid` cookie
    Cookie(String),
    /// Exchanged for a cookie at login time
    Login { email: String, password: String },
}

impl SubstackAuth {
    pub fn method(&self) -> &'static str {
        match self {
            SubstackAuth::Cookie(_) => "cookie",
            SubstackAuth::Login { .. } => "email/password",
        }
    }
}

impl fmt::Debug for SubstackAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubstackAuth({})", self.method())
    }
}

/// Resolved credential for one blog
#[derive(Clone, PartialEq, Eq)]
pub enum BlogCredential {
    WordPress { password: String },
    Ghost { api_key: String },
    Substack(SubstackAuth),
    DevTo { api_key: String },
}

impl fmt::Debug for BlogCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlogCredential::WordPress { .. } => f.write_str("WordPress(<password>)"),
            BlogCredential::Ghost { .. } => f.write_str("Ghost(<api key>)"),
            BlogCredential::Substack(auth) => write!(f, "Substack({})", auth.method()),
            BlogCredential::DevTo { .. } => f.write_str("DevTo(<api key>)"),
        }
    }
}

/// Reads and writes per-blog credentials
#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn SecretStore>,
}

impl CredentialVault {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    async fn get(&self, platform: Platform, blog: &str, kind: CredentialKind) -> Result<Option<String>, AppError> {
        let value = self.store.get(&secret_key(platform, blog, kind)).await?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    /// Look up the credential for a blog; `None` when nothing is stored
    ///
    /// Substack prefers an email/password pair over a stored cookie.
    pub async fn resolve(&self, platform: Platform, blog: &str) -> Result<Option<BlogCredential>, AppError> {
        let credential = match platform {
            Platform::Blogger => None,
            Platform::WordPress => self
                .get(platform, blog, CredentialKind::Password)
                .await?
                .map(|password| BlogCredential::WordPress { password }),
            Platform::Ghost => self
                .get(platform, blog, CredentialKind::ApiKey)
                .await?
                .map(|api_key| BlogCredential::Ghost { api_key }),
            Platform::DevTo => self
                .get(platform, blog, CredentialKind::ApiKey)
                .await?
                .map(|api_key| BlogCredential::DevTo { api_key }),
            Platform::Substack => {
                let email = self.get(platform, blog, CredentialKind::Email).await?;
                let password = self.get(platform, blog, CredentialKind::Password).await?;
                match (email, password) {
                    (Some(email), Some(password)) => {
                        Some(BlogCredential::Substack(SubstackAuth::Login { email, password }))
                    }
                    _ => self
                        .get(platform, blog, CredentialKind::ApiKey)
                        .await?
                        .map(|cookie| BlogCredential::Substack(SubstackAuth::Cookie(cookie))),
                }
            }
        };

        debug!(
            "Credential lookup for {} blog \"{}\": {}",
            platform,
            blog,
            if credential.is_some() { "found" } else { "missing" }
        );
        Ok(credential)
    }

    pub async fn has_credential(&self, platform: Platform, blog: &str) -> Result<bool, AppError> {
        Ok(self.resolve(platform, blog).await?.is_some())
    }

    /// Store the single-value credential of a blog
    ///
    /// WordPress: application password. Ghost: admin API key (`id:secret`).
    /// Dev.to: API key. Substack: `connect.sid` cookie, which replaces any
    /// stored email/password pair.
    pub async fn set_primary(&self, platform: Platform, blog: &str, value: &str) -> Result<(), AppError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(AppError::InvalidInput("Credential value cannot be empty".to_string()));
        }

        let kind = match platform {
            Platform::Blogger => {
                return Err(AppError::Configuration(
                    "Blogger uses Google sign-in instead of a per-blog credential. Run `liveblog login`.".to_string(),
                ))
            }
            Platform::WordPress => CredentialKind::Password,
            Platform::Ghost => {
                GhostAdminKey::parse(value)?;
                CredentialKind::ApiKey
            }
            Platform::DevTo | Platform::Substack => CredentialKind::ApiKey,
        };

        self.store
            .store(&secret_key(platform, blog, kind), value)
            .await?;

        if platform == Platform::Substack {
            for kind in [CredentialKind::Email, CredentialKind::Password] {
                self.delete_best_effort(platform, blog, kind).await;
            }
        }

        info!("Stored {} {} for \"{}\"", platform, kind, blog);
        Ok(())
    }

    /// Store a Substack email/password pair, replacing any stored cookie
    pub async fn set_substack_login(&self, blog: &str, email: &str, password: &str) -> Result<(), AppError> {
        let (email, password) = (email.trim(), password.trim());
        if email.is_empty() || password.is_empty() {
            return Err(AppError::InvalidInput(
                "Both email and password are required".to_string(),
            ));
        }

        let platform = Platform::Substack;
        self.store
            .store(&secret_key(platform, blog, CredentialKind::Email), email)
            .await?;
        self.store
            .store(&secret_key(platform, blog, CredentialKind::Password), password)
            .await?;
        self.delete_best_effort(platform, blog, CredentialKind::ApiKey).await;

        info!("Stored Substack email/password for \"{}\"", blog);
        Ok(())
    }

    /// Move a blog's credentials to a new blog name
    ///
    /// Every key is copied before any old key is deleted. A failed copy
    /// removes the copies already made and leaves the old keys untouched; a
    /// failed delete is logged and leaves a stale key.
    pub async fn migrate(&self, platform: Platform, old_name: &str, new_name: &str) -> Result<usize, AppError> {
        if old_name == new_name {
            return Ok(0);
        }

        let mut copied = Vec::new();
        for &kind in CredentialKind::for_platform(platform) {
            let old_key = secret_key(platform, old_name, kind);
            let Some(value) = self.store.get(&old_key).await? else {
                continue;
            };

            if let Err(e) = self
                .store
                .store(&secret_key(platform, new_name, kind), &value)
                .await
            {
                for &done in &copied {
                    self.delete_best_effort(platform, new_name, done).await;
                }
                return Err(e);
            }
            copied.push(kind);
        }

        for &kind in &copied {
            let old_key = secret_key(platform, old_name, kind);
            if let Err(e) = self.store.delete(&old_key).await {
                warn!("Failed to delete old credential {}: {}", old_key, e);
            }
        }

        debug!(
            "Migrated {} credential(s) from \"{}\" to \"{}\"",
            copied.len(),
            old_name,
            new_name
        );
        Ok(copied.len())
    }

    /// Delete every credential of a blog, logging failures
    pub async fn forget(&self, platform: Platform, blog: &str) {
        for &kind in CredentialKind::for_platform(platform) {
            self.delete_best_effort(platform, blog, kind).await;
        }
    }

    async fn delete_best_effort(&self, platform: Platform, blog: &str, kind: CredentialKind) {
        let key = secret_key(platform, blog, kind);
        if let Err(e) = self.store.delete(&key).await {
            warn!("Failed to delete credential {}: {}", key, e);
        }
    }
}
