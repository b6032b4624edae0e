use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{AppError, AppResult};

/// String key/value store for credentials.
pub trait SecureStorage: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn delete(&self, key: &str) -> AppResult<()>;
}

/// One JSON object per profile, written with owner-only permissions.
#[derive(Debug)]
pub struct FileSecureStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecureStorage {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_entries(&self) -> AppResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&raw).map_err(|err| {
            AppError::Storage(format!(
                "credentials file {} is corrupt: {err}",
                self.path.display()
            ))
        })
    }

    /// Entries to rewrite. An unreadable file is replaced rather than
    /// blocking logout or a new login.
    fn entries_for_write(&self) -> AppResult<BTreeMap<String, String>> {
        match self.read_entries() {
            Err(AppError::Storage(reason)) => {
                debug!(%reason, "overwriting corrupt credentials file");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> AppResult<()> {
        if entries.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let payload = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, payload)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SecureStorage for FileSecureStorage {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let _guard = self.guard();
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let _guard = self.guard();
        let mut entries = self.entries_for_write()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn delete(&self, key: &str) -> AppResult<()> {
        let _guard = self.guard();
        match self.read_entries() {
            Ok(mut entries) => {
                if entries.remove(key).is_some() {
                    self.write_entries(&entries)?;
                }
                Ok(())
            }
            Err(AppError::Storage(reason)) => {
                debug!(%reason, "overwriting corrupt credentials file");
                self.write_entries(&BTreeMap::new())
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySecureStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemorySecureStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SecureStorage for MemorySecureStorage {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> AppResult<()> {
        self.entries().remove(key);
        Ok(())
    }
}
