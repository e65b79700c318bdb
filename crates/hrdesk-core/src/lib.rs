//! hrdesk-core - session management for the HR dashboard API.
//!
//! The `SessionManager` acquires, persists, attaches, and refreshes the
//! credentials used by every API call, and tears the session down when the
//! credentials can no longer be repaired.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use hrdesk_core::{Config, LoginRequest, SessionManager};
//!
//! let config = Config::load()?;
//! let session = SessionManager::from_config(&config)?;
//! session.initialize().await;
//!
//! if !session.is_authenticated() {
//!     session.login(&LoginRequest::new("admin", "admin123")).await?;
//! }
//! let tasks: serde_json::Value = session.get_json("/tasks").await?;
//! # let _ = tasks;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod notifications;

pub use api::{ApiClient, ApiError, ApiRequest};
pub use auth::{
    CredentialPair, FileTokenStore, KeyringTokenStore, MemoryTokenStore, SessionManager,
    SessionSnapshot, SessionState, TokenStore,
};
pub use config::{Config, TokenStoreKind};
pub use models::{LoginRequest, Notification, ProfileUpdate, RegisterRequest, Role, User};
pub use notifications::NotificationCenter;
