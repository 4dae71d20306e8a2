use super::SecretStore;
use crate::error::AppError;
use async_trait::async_trait;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// JSON file backend with user-only permissions
///
/// Every mutation is a locked read-modify-write so two processes sharing the
/// file do not drop each other's keys. Reads take the same lock shared.
pub struct FileStore {
    path: PathBuf,
}

type SecretMap = BTreeMap<String, String>;

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<SecretMap, AppError> {
        if !self.path.exists() {
            return Ok(SecretMap::new());
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| AppError::Storage(format!("Failed to read secrets file: {}", e)))?;
        if contents.trim().is_empty() {
            return Ok(SecretMap::new());
        }
        serde_json::from_str(&contents)
            .map_err(|e| AppError::Storage(format!("Failed to parse secrets file: {}", e)))
    }

    fn write(&self, map: &SecretMap) -> Result<(), AppError> {
        let contents = serde_json::to_string_pretty(map)?;
        fs::write(&self.path, contents)
            .map_err(|e| AppError::Storage(format!("Failed to write secrets file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms)?;
        }
        Ok(())
    }

    fn lock_file(&self) -> Result<fs::File, AppError> {
        let lock_path = self.path.with_extension("lock");
        Ok(fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?)
    }

    /// Read the stored map while holding a shared lock
    fn read_locked(&self) -> Result<SecretMap, AppError> {
        if !self.path.exists() {
            return Ok(SecretMap::new());
        }

        let lock_file = self.lock_file()?;
        lock_file.lock_shared()?;
        let result = self.read();
        lock_file.unlock()?;
        result
    }

    /// Apply `change` to the stored map while holding an exclusive lock
    fn modify<F>(&self, change: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut SecretMap) -> bool,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = self.lock_file()?;
        lock_file.lock_exclusive()?;

        let result = self.read().and_then(|mut map| {
            if change(&mut map) {
                self.write(&map)
            } else {
                Ok(())
            }
        });

        lock_file.unlock()?;
        result
    }
}

#[async_trait]
impl SecretStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.read_locked()?.get(key).cloned())
    }

    async fn store(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.modify(|map| {
            map.insert(key.to_string(), value.to_string());
            true
        })
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.modify(|map| map.remove(key).is_some())
    }
}
