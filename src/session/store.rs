//! Persistent key/value storage for the session token and saved credentials.
//!
//! Saved credentials are base64-encoded JSON. This is obfuscation, not encryption:
//! anyone who can read the store file can recover the password.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

pub const TOKEN_KEY: &str = "auth_token";
pub const CREDENTIALS_KEY: &str = "saved_credentials";
pub const LEGACY_API_KEY: &str = "legacy_api_key";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// A store kept only in memory
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// A store backed by a single JSON object file.
///
/// Every write rewrites the whole file through a temporary sibling and a rename.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session store: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session store: {}", self.path.display()))
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(values)?;
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write session store: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace session store: {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

/// Login credentials kept for silent re-authentication
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// base64(JSON)
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64.encode(json))
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .context("Saved credentials are not valid base64")?;
        serde_json::from_slice(&bytes).context("Saved credentials are not valid JSON")
    }
}

/// Session token and saved credentials on top of a `KeyValueStore`
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn token(&self) -> Result<Option<String>> {
        Ok(self.store.get(TOKEN_KEY)?.filter(|t| !t.is_empty()))
    }

    pub fn save_token(&self, token: &str) -> Result<()> {
        self.store.set(TOKEN_KEY, token)
    }

    pub fn clear_token(&self) -> Result<()> {
        self.store.remove(TOKEN_KEY)
    }

    /// Saved credentials. An undecodable entry is dropped and reads as absent.
    pub fn credentials(&self) -> Result<Option<Credentials>> {
        let Some(encoded) = self.store.get(CREDENTIALS_KEY)? else {
            return Ok(None);
        };
        match Credentials::decode(&encoded) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable saved credentials");
                self.store.remove(CREDENTIALS_KEY)?;
                Ok(None)
            }
        }
    }

    pub fn save_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.store.set(CREDENTIALS_KEY, &credentials.encode()?)
    }

    pub fn clear_credentials(&self) -> Result<()> {
        self.store.remove(CREDENTIALS_KEY)
    }

    pub fn legacy_api_key(&self) -> Result<Option<String>> {
        Ok(self.store.get(LEGACY_API_KEY)?.filter(|k| !k.is_empty()))
    }

    pub fn save_legacy_api_key(&self, api_key: &str) -> Result<()> {
        self.store.set(LEGACY_API_KEY, api_key)
    }

    pub fn clear_legacy_api_key(&self) -> Result<()> {
        self.store.remove(LEGACY_API_KEY)
    }
}
