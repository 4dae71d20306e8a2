use super::SecretStore;
use crate::error::AppError;
use async_trait::async_trait;
use ::keyring::Entry;

const SERVICE_NAME: &str = "liveblog";

/// OS keyring backend, one entry per secret key
pub struct KeyringStore {
    service_name: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
        }
    }

    /// Test if a keyring entry can be created on this system
    pub fn is_available() -> bool {
        Entry::new(SERVICE_NAME, "probe").is_ok()
    }

    fn entry(&self, key: &str) -> Result<Entry, AppError> {
        Entry::new(&self.service_name, key)
            .map_err(|e| AppError::Storage(format!("Failed to create keyring entry: {}", e)))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(::keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to read {} from keyring: {}",
                key, e
            ))),
        }
    }

    async fn store(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| AppError::Storage(format!("Failed to store {} in keyring: {}", key, e)))
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(::keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to delete {} from keyring: {}",
                key, e
            ))),
        }
    }
}
