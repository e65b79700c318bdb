use serde::Serialize;

use crate::models::User;

/// Observable lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Startup check has not finished. Gated views must wait.
    Initializing,
    Guest,
    Authenticated,
    /// A refresh call is in flight for an authenticated session.
    Refreshing,
}

/// What route guards and views observe through `SessionManager::subscribe`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<User>,
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn initializing() -> Self {
        Self {
            state: SessionState::Initializing,
            user: None,
            loading: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// In-memory credentials and profile owned by the session manager.
#[derive(Debug)]
pub(crate) struct SessionData {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
    pub loading: bool,
    pub refreshing: bool,
    /// Bumped on every credential change; used to coalesce refreshes.
    pub generation: u64,
}

impl SessionData {
    pub fn new() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            user: None,
            loading: true,
            refreshing: false,
            generation: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.loading {
            SessionState::Initializing
        } else if self.user.is_none() {
            SessionState::Guest
        } else if self.refreshing {
            SessionState::Refreshing
        } else {
            SessionState::Authenticated
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            user: self.user.clone(),
            loading: self.loading,
        }
    }

    /// Drop tokens and profile, invalidating any in-flight refresh.
    pub fn clear(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.user = None;
        self.refreshing = false;
        self.generation += 1;
    }
}
