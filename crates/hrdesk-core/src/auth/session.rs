//! The session manager: owns the credential pair and the signed-in user,
//! attaches bearer tokens to outgoing requests, and silently refreshes an
//! expired access token when a request comes back 401.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::api::client::{
    CHANGE_PASSWORD_PATH, FORGOT_PASSWORD_PATH, PROFILE_PATH, REGISTER_PATH, RESET_PASSWORD_PATH,
};
use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::config::Config;
use crate::models::{
    ChangePasswordRequest, ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest,
    MessageResponse, ProfileResponse, ProfileUpdate, RegisterRequest, RegisterResponse,
    ResetPasswordRequest, User,
};

use super::credentials::{CredentialPair, TokenStore};
use super::state::{SessionData, SessionSnapshot, SessionState};

/// Session manager for one client instance.
/// Clone is cheap - all clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    data: RwLock<SessionData>,
    /// Held for the duration of a refresh. Remembers the last failed
    /// attempt so requests that were in flight during it don't repeat it.
    refresh_gate: Mutex<Option<FailedRefresh>>,
    /// Number of refresh attempts started so far
    refresh_attempts: AtomicU64,
    snapshot: watch::Sender<SessionSnapshot>,
}

#[derive(Debug, Clone, Copy)]
struct FailedRefresh {
    generation: u64,
    attempt: u64,
}

impl SessionManager {
    pub fn new(api: ApiClient, store: Arc<dyn TokenStore>) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::initializing());
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                data: RwLock::new(SessionData::new()),
                refresh_gate: Mutex::new(None),
                refresh_attempts: AtomicU64::new(0),
                snapshot,
            }),
        }
    }

    /// Build a manager from configuration: API client plus configured token store
    pub fn from_config(config: &Config) -> Result<Self> {
        let api = ApiClient::new(&config.api_base_url, config.request_timeout())?;
        let store = config.open_token_store()?;
        Ok(Self::new(api, store))
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionData> {
        self.inner.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionData> {
        self.inner.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a change and publish the resulting snapshot before the lock is
    /// released, so observers never see snapshots out of order.
    fn mutate<R>(&self, apply: impl FnOnce(&mut SessionData) -> R) -> R {
        let mut data = self.write();
        let result = apply(&mut data);
        self.inner.snapshot.send_replace(data.snapshot());
        result
    }

    /// Mirror the in-memory tokens into durable storage (best effort).
    fn persist(&self, data: &SessionData) {
        let pair = CredentialPair {
            access_token: data.access_token.clone(),
            refresh_token: data.refresh_token.clone(),
        };
        if let Err(e) = pair.persist(self.inner.store.as_ref()) {
            warn!(error = %e, "Failed to persist tokens");
        }
    }

    // ===== Observation =====

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Watch session changes. Route guards should wait while `loading` is true.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.read().state()
    }

    pub fn user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().user.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    /// Current in-memory token pair
    pub fn credentials(&self) -> CredentialPair {
        let data = self.read();
        CredentialPair {
            access_token: data.access_token.clone(),
            refresh_token: data.refresh_token.clone(),
        }
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.read()
            .user
            .as_ref()
            .is_some_and(|user| user.has_permission(name))
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.read()
            .user
            .as_ref()
            .is_some_and(|user| user.has_role(name))
    }

    // ===== Lifecycle =====

    /// Restore the stored session. Run once at startup; always ends with
    /// `loading == false`, either authenticated or as a guest. Stored tokens
    /// are only discarded when the backend rejects them.
    pub async fn initialize(&self) {
        let stored = CredentialPair::load(self.inner.store.as_ref());
        let access_token = stored.access_token.clone();
        let has_refresh_token = stored.refresh_token.is_some();

        self.mutate(|data| {
            data.access_token = stored.access_token;
            data.refresh_token = stored.refresh_token;
            data.generation += 1;
        });

        let Some(access_token) = access_token else {
            info!("No stored access token, starting as guest");
            self.finish_loading();
            return;
        };

        let user = match self.inner.api.profile(&access_token).await {
            Ok(user) => Some(user),
            Err(e) if e.is_credential_rejected() => {
                if has_refresh_token {
                    debug!("Stored access token rejected, attempting refresh");
                    self.rescue_profile().await
                } else {
                    debug!("Stored access token rejected and no refresh token");
                    None
                }
            }
            Err(e) => {
                // Backend unreachable or failing: start as guest, keep the stored pair
                warn!(error = %e, "Stored session could not be validated, keeping it for later");
                self.mutate(|data| {
                    data.access_token = None;
                    data.refresh_token = None;
                    data.generation += 1;
                    data.loading = false;
                });
                return;
            }
        };

        match user {
            Some(user) => {
                info!(user_id = user.id, "Session restored");
                self.mutate(|data| {
                    if data.access_token.is_some() {
                        data.user = Some(user);
                    }
                });
            }
            None => self.forced_logout(),
        }
        self.finish_loading();
    }

    /// One refresh, then one more profile fetch. Any failure fails closed.
    async fn rescue_profile(&self) -> Option<User> {
        let access_token = self.refresh_access_token().await?;
        match self.inner.api.profile(&access_token).await {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Profile fetch failed after refresh");
                None
            }
        }
    }

    fn finish_loading(&self) {
        self.mutate(|data| data.loading = false);
    }

    /// Sign in. On failure nothing changes and the error carries the
    /// backend's message (see `ApiError::user_message`).
    pub async fn login(&self, credentials: &LoginRequest) -> Result<User, ApiError> {
        let response = match self.inner.api.login(credentials).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Login failed");
                return Err(e);
            }
        };

        let user = response.user.clone();
        self.mutate(|data| {
            data.access_token = Some(response.access_token);
            data.refresh_token = response.refresh_token;
            data.user = Some(response.user);
            data.loading = false;
            data.refreshing = false;
            data.generation += 1;
            self.persist(data);
        });

        info!(user_id = user.id, "Login successful");
        Ok(user)
    }

    /// Notify the backend (best effort), then always tear down locally.
    pub async fn logout(&self) {
        let access_token = self.read().access_token.clone();
        if let Some(access_token) = access_token {
            if let Err(e) = self.inner.api.logout(&access_token).await {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
            }
        }
        self.forced_logout();
    }

    /// Unconditional local teardown: memory, storage, and bearer token.
    fn forced_logout(&self) {
        let was_authenticated = self.mutate(|data| {
            let was_authenticated = data.user.is_some();
            data.clear();
            self.persist(data);
            was_authenticated
        });
        if was_authenticated {
            info!("Session ended");
        }
    }

    // ===== Token Refresh =====

    /// Mint a new access token with the refresh token. Returns `None` without
    /// touching the session when there is no refresh token or the call fails.
    pub async fn refresh_access_token(&self) -> Option<String> {
        let mut last_failure = self.inner.refresh_gate.lock().await;
        let generation = self.read().generation;
        self.run_refresh(&mut last_failure, generation).await
    }

    /// Refresh on behalf of a request that was sent with credentials of
    /// `seen_generation` after `seen_attempt` refreshes had started.
    /// Concurrent callers share a single refresh call.
    async fn refresh_after(&self, seen_generation: u64, seen_attempt: u64) -> Option<String> {
        let mut last_failure = self.inner.refresh_gate.lock().await;

        let (generation, current) = {
            let data = self.read();
            (data.generation, data.access_token.clone())
        };
        if generation != seen_generation {
            debug!("Credentials changed while request was in flight, reusing current token");
            return current;
        }
        if let Some(failed) = *last_failure {
            // Only a refresh that started after this request was sent covers it
            if failed.generation == seen_generation && failed.attempt > seen_attempt {
                debug!("Refresh already failed while this request was in flight");
                return None;
            }
        }

        self.run_refresh(&mut last_failure, seen_generation).await
    }

    /// Caller passes the held gate guard.
    async fn run_refresh(
        &self,
        last_failure: &mut Option<FailedRefresh>,
        generation: u64,
    ) -> Option<String> {
        let attempt = self.inner.refresh_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let token = self.refresh_locked(generation).await;
        *last_failure = match token {
            Some(_) => None,
            None => Some(FailedRefresh { generation, attempt }),
        };
        token
    }

    /// Caller must hold the refresh gate.
    async fn refresh_locked(&self, generation: u64) -> Option<String> {
        let refresh_token = self.read().refresh_token.clone();
        let Some(refresh_token) = refresh_token else {
            debug!("No refresh token, skipping refresh");
            return None;
        };

        self.mutate(|data| data.refreshing = true);
        let result = self.inner.api.refresh(&refresh_token).await;

        self.mutate(|data| {
            data.refreshing = false;
            match result {
                Ok(tokens) if data.generation == generation => {
                    let rotated = tokens.refresh_token.is_some();
                    data.access_token = Some(tokens.access_token.clone());
                    if let Some(next) = tokens.refresh_token {
                        data.refresh_token = Some(next);
                    }
                    data.generation += 1;
                    self.persist(data);
                    debug!(rotated, "Access token refreshed");
                    Some(tokens.access_token)
                }
                Ok(_) => {
                    warn!("Discarding refreshed token for a session that has since changed");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh failed");
                    None
                }
            }
        })
    }

    // ===== Authenticated Requests =====

    /// Send a request with the current bearer token. A 401 triggers one
    /// refresh and one retry; if the refresh fails the original 401 is
    /// returned and the session is left for the caller to end.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let (access_token, generation) = {
            let data = self.read();
            (data.access_token.clone(), data.generation)
        };
        let attempt = self.inner.refresh_attempts.load(Ordering::SeqCst);

        match self.inner.api.send(request, access_token.as_deref()).await {
            Err(ApiError::Unauthorized(message)) if request.allows_refresh() => {
                debug!(path = %request.path, "Request rejected, refreshing access token");
                match self.refresh_after(generation, attempt).await {
                    // Retried exactly once: a second 401 goes to the caller
                    Some(fresh) => self.inner.api.send(request, Some(&fresh)).await,
                    None => Err(ApiError::Unauthorized(message)),
                }
            }
            other => other,
        }
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        ApiClient::parse_json(response).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request_json(&ApiRequest::get(path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(&ApiRequest::post(path, body)?).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(&ApiRequest::put(path, body)?).await
    }

    /// PUT without a body, e.g. state toggles like "mark as read"
    pub async fn put_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request_json(&ApiRequest::new(Method::PUT, path)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(&ApiRequest::delete(path)).await?;
        Ok(())
    }

    // ===== Account Operations =====

    /// Update the profile and replace the in-memory user with the result.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let response: ProfileResponse = self.put_json(PROFILE_PATH, update).await?;
        let user = response.user;
        self.mutate(|data| {
            if data.access_token.is_some() {
                data.user = Some(user.clone());
            }
        });
        Ok(user)
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<String, ApiError> {
        let body = ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        let response: MessageResponse = self.post_json(CHANGE_PASSWORD_PATH, &body).await?;
        Ok(response.message)
    }

    pub async fn forgot_password(&self, email: &str) -> Result<ForgotPasswordResponse, ApiError> {
        let body = ForgotPasswordRequest {
            email: email.to_string(),
        };
        self.post_json(FORGOT_PASSWORD_PATH, &body).await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<String, ApiError> {
        let body = ResetPasswordRequest {
            token: token.to_string(),
            new_password: new_password.to_string(),
        };
        let response: MessageResponse = self.post_json(RESET_PASSWORD_PATH, &body).await?;
        Ok(response.message)
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        let response: RegisterResponse = self.post_json(REGISTER_PATH, request).await?;
        Ok(response.user)
    }
}
