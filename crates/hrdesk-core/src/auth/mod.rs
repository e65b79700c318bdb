//! Authentication module for managing user sessions and tokens.
//!
//! This module provides:
//! - `SessionManager`: login/logout, startup restore, and silent token refresh
//! - `TokenStore`: durable storage for the access/refresh token pair, backed by
//!   the OS keychain (`KeyringTokenStore`), a JSON file (`FileTokenStore`), or
//!   memory (`MemoryTokenStore`)
//!
//! Access tokens are short-lived. A request rejected with 401 is retried once
//! after the refresh token has minted a new access token; concurrent
//! rejections share a single refresh call.

pub mod credentials;
pub mod session;
pub mod state;
pub mod token_file;

pub use credentials::{
    CredentialPair, KeyringTokenStore, MemoryTokenStore, TokenStore, ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
};
pub use session::SessionManager;
pub use state::{SessionSnapshot, SessionState};
pub use token_file::FileTokenStore;
