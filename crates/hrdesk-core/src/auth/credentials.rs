use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::warn;

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "token";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

const SERVICE_NAME: &str = "hrdesk";

/// The access/refresh token pair. Absence of `access_token` means
/// unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    /// Read both tokens from a store. Read failures are logged and treated
    /// as an absent token.
    pub fn load(store: &dyn TokenStore) -> Self {
        Self {
            access_token: read_or_warn(store, ACCESS_TOKEN_KEY),
            refresh_token: read_or_warn(store, REFRESH_TOKEN_KEY),
        }
    }

    /// Mirror both tokens into a store, removing keys for absent tokens.
    pub fn persist(&self, store: &dyn TokenStore) -> Result<()> {
        write_key(store, ACCESS_TOKEN_KEY, self.access_token.as_deref())?;
        write_key(store, REFRESH_TOKEN_KEY, self.refresh_token.as_deref())?;
        Ok(())
    }
}

fn read_or_warn(store: &dyn TokenStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            warn!(key, error = %e, "Failed to read token from storage");
            None
        }
    }
}

fn write_key(store: &dyn TokenStore, key: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(value) => store.set(key, value),
        None => store.remove(key),
    }
}

/// Durable string key-value storage for tokens.
///
/// Writes are synchronous; the session manager treats the store as a
/// write-through mirror and only reads it at startup.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a token pair
    pub fn with_tokens(access_token: Option<&str>, refresh_token: Option<&str>) -> Self {
        let store = Self::new();
        {
            let mut entries = store.lock();
            if let Some(token) = access_token {
                entries.insert(ACCESS_TOKEN_KEY.to_string(), token.to_string());
            }
            if let Some(token) = refresh_token {
                entries.insert(REFRESH_TOKEN_KEY.to_string(), token.to_string());
            }
        }
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Tokens kept in the OS keychain, one entry per key.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringTokenStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store token in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}
