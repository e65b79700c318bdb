//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! API base URL, request timeout, where tokens are kept, and the last
//! username used to sign in.
//!
//! Configuration is stored at `~/.config/hrdesk/config.json`. The
//! `HRDESK_API_URL` and `HRDESK_TOKEN_STORE` environment variables override
//! the file.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::DEFAULT_TIMEOUT_SECS;
use crate::auth::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "hrdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_URL: &str = "http://localhost:5000/api";

const API_URL_ENV: &str = "HRDESK_API_URL";
const TOKEN_STORE_ENV: &str = "HRDESK_TOKEN_STORE";

/// Where the token pair is persisted between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreKind {
    #[default]
    Keyring,
    File,
    /// Not persisted: every run starts as a guest
    Memory,
}

impl FromStr for TokenStoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(Self::Keyring),
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown token store: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub token_store: TokenStoreKind,
    pub last_username: Option<String>,
    /// Directory for rolling log files; stderr only when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            token_store: TokenStoreKind::default(),
            last_username: None,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults if absent), then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env()?;
        debug!(
            api_base_url = %config.api_base_url,
            token_store = ?config.token_store,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(TOKEN_STORE_ENV).ok(),
        )
    }

    fn apply_overrides(
        &mut self,
        api_url: Option<String>,
        token_store: Option<String>,
    ) -> Result<()> {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(kind) = token_store {
            self.token_store = kind
                .parse()
                .with_context(|| format!("Invalid {}", TOKEN_STORE_ENV))?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Open the configured token store
    pub fn open_token_store(&self) -> Result<Arc<dyn TokenStore>> {
        let store: Arc<dyn TokenStore> = match self.token_store {
            TokenStoreKind::Keyring => Arc::new(KeyringTokenStore::default()),
            TokenStoreKind::File => Arc::new(FileTokenStore::new(&self.data_dir()?)),
            TokenStoreKind::Memory => Arc::new(MemoryTokenStore::new()),
        };
        Ok(store)
    }
}
