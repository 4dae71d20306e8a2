//! Secret storage for credentials and OAuth tokens
//!
//! Keys are flat strings such as `ghost.My Blog.apikey` or `blogger.token`.
//! The OS keyring is preferred; a user-only JSON file is the fallback.

mod file;
mod keyring;

pub use file::FileStore;
pub use keyring::KeyringStore;

use crate::error::AppError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Async key-value store scoped to the current user
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn store(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// Remove a key; deleting an absent key succeeds
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

/// Which secret backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SecretBackend {
    /// OS keyring when available, otherwise the secrets file
    #[default]
    Auto,
    Keyring,
    File,
}

/// Get the default path of the fallback secrets file
pub fn secrets_path() -> Result<PathBuf, AppError> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Storage("Cannot determine config directory".to_string()))?;
    Ok(config_dir.join("liveblog").join("secrets.json"))
}

/// Open the requested backend
pub fn open(backend: SecretBackend) -> Result<Arc<dyn SecretStore>, AppError> {
    match backend {
        SecretBackend::Keyring => Ok(Arc::new(KeyringStore::new())),
        SecretBackend::File => Ok(Arc::new(FileStore::new(secrets_path()?))),
        SecretBackend::Auto => {
            if KeyringStore::is_available() {
                debug!("Using OS keyring for secrets");
                Ok(Arc::new(KeyringStore::new()))
            } else {
                debug!("OS keyring unavailable, using secrets file");
                Ok(Arc::new(FileStore::new(secrets_path()?)))
            }
        }
    }
}

/// In-process store, used when nothing should touch the user's profile
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, AppError> {
        self.values
            .lock()
            .map_err(|_| AppError::Storage("Secret store lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().map(|m| m.contains_key(key)).unwrap_or(false)
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn store(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic_operations() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.store("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.is_empty());
    }
}
