use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::credentials::TokenStore;

/// Token file name in the data directory
pub const TOKEN_FILE: &str = "tokens.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TokenFileData {
    #[serde(default)]
    tokens: BTreeMap<String, String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Tokens persisted as a small JSON document on disk.
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(data_dir: &Path) -> Self {
        Self::at_path(data_dir.join(TOKEN_FILE))
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<TokenFileData> {
        if !self.path.exists() {
            return Ok(TokenFileData::default());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read token file {}", self.path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse token file")
    }

    fn save(&self, data: &TokenFileData) -> Result<()> {
        if data.tokens.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove token file")?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write token file {}", self.path.display()))?;
        restrict_permissions(&self.path)?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut data = self.load()?;
        apply(&mut data.tokens);
        data.updated_at = Some(Utc::now());
        self.save(&data)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .context("Failed to restrict token file permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.tokens.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|tokens| {
            tokens.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|tokens| {
            tokens.remove(key);
        })
    }
}
