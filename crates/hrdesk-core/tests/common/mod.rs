//! In-process mock of the HR dashboard backend for integration tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use hrdesk_core::{ApiClient, MemoryTokenStore, SessionManager};

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "admin123";

#[derive(Clone, Default)]
pub struct Backend {
    inner: Arc<BackendState>,
}

#[derive(Default)]
pub struct BackendState {
    access_tokens: Mutex<HashSet<String>>,
    refresh_tokens: Mutex<HashSet<String>>,
    issued: AtomicUsize,
    calls: Mutex<Vec<String>>,
    task_auth_headers: Mutex<Vec<String>>,
    user: Mutex<Option<Value>>,
    notifications: Mutex<Vec<Value>>,
    pub rotate_refresh: AtomicBool,
    pub refresh_fails: AtomicBool,
    pub logout_fails: AtomicBool,
    pub reject_all_tasks: AtomicBool,
    pub login_omits_refresh: AtomicBool,
    pub profile_fails: AtomicBool,
    refresh_delay_ms: AtomicUsize,
}

#[allow(dead_code)]
impl Backend {
    pub fn new() -> Self {
        let backend = Self::default();
        *backend.inner.user.lock().unwrap() = Some(admin_user());
        *backend.inner.notifications.lock().unwrap() = vec![
            notification(2, false, "Task assigned: Onboarding"),
            notification(1, false, "Your leave request was approved"),
        ];
        backend
    }

    pub fn state(&self) -> &BackendState {
        &self.inner
    }

    pub fn accept_access(&self, token: &str) {
        self.inner.access_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn accept_refresh(&self, token: &str) {
        self.inner.refresh_tokens.lock().unwrap().insert(token.to_string());
    }

    /// Expire every access token issued so far
    pub fn expire_access_tokens(&self) {
        self.inner.access_tokens.lock().unwrap().clear();
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.inner
            .refresh_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, route: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == route).count()
    }

    pub fn task_auth_headers(&self) -> Vec<String> {
        self.inner.task_auth_headers.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.inner.calls.lock().unwrap().push(call.to_string());
    }

    fn next_id(&self) -> usize {
        self.inner.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn access_valid(&self, headers: &HeaderMap) -> bool {
        bearer(headers).is_some_and(|t| self.inner.access_tokens.lock().unwrap().contains(&t))
    }
}

pub fn admin_user() -> Value {
    json!({
        "id": 1,
        "username": USERNAME,
        "email": "admin@example.com",
        "first_name": "Ada",
        "last_name": "Admin",
        "is_active": true,
        "roles": [{"id": 1, "name": "Admin", "description": "Full access"}],
        "permissions": ["user_read"]
    })
}

fn notification(id: i64, is_read: bool, message: &str) -> Value {
    json!({
        "id": id,
        "user_id": 1,
        "sender_id": 2,
        "message": message,
        "type": "task_assigned",
        "related_id": null,
        "is_read": is_read,
        "recipient": {"id": 1, "username": USERNAME},
        "sender": {"id": 2, "username": "manager"},
        "timestamp": "2024-05-01T09:30:00.000000Z"
    })
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn expired() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "Token has expired" }))).into_response()
}

async fn login(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.record("POST /auth/login");
    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Username and password are required");
    }
    if username != USERNAME || password != PASSWORD {
        return error(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }

    let n = backend.next_id();
    let access = format!("A{}", n);
    let refresh = format!("R{}", n);
    backend.accept_access(&access);
    backend.accept_refresh(&refresh);
    let user = backend.inner.user.lock().unwrap().clone();

    let mut body = json!({
        "message": "Login successful",
        "access_token": access,
        "user": user,
    });
    if !backend.inner.login_omits_refresh.load(Ordering::SeqCst) {
        body["refresh_token"] = json!(refresh);
    }
    Json(body).into_response()
}

async fn logout(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.record("POST /auth/logout");
    if backend.inner.logout_fails.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable");
    }
    let Some(token) = bearer(&headers) else {
        return expired();
    };
    if !backend.inner.access_tokens.lock().unwrap().remove(&token) {
        return expired();
    }
    Json(json!({ "message": "Successfully logged out" })).into_response()
}

async fn refresh(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.record("POST /auth/token/refresh");
    let delay = backend.inner.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }

    let Some(token) = bearer(&headers) else {
        return expired();
    };
    if backend.inner.refresh_fails.load(Ordering::SeqCst)
        || !backend.inner.refresh_tokens.lock().unwrap().contains(&token)
    {
        let body = Json(json!({ "msg": "Token has been revoked" }));
        return (StatusCode::UNAUTHORIZED, body).into_response();
    }

    let n = backend.next_id();
    let access = format!("A{}", n);
    backend.accept_access(&access);
    if backend.inner.rotate_refresh.load(Ordering::SeqCst) {
        let rotated = format!("R{}", n);
        let mut refresh_tokens = backend.inner.refresh_tokens.lock().unwrap();
        refresh_tokens.remove(&token);
        refresh_tokens.insert(rotated.clone());
        Json(json!({ "access_token": access, "refresh_token": rotated })).into_response()
    } else {
        Json(json!({ "access_token": access })).into_response()
    }
}

async fn get_profile(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.record("GET /auth/profile");
    if backend.inner.profile_fails.load(Ordering::SeqCst) {
        return error(StatusCode::SERVICE_UNAVAILABLE, "database unavailable");
    }
    if !backend.access_valid(&headers) {
        return expired();
    }
    let user = backend.inner.user.lock().unwrap().clone();
    Json(json!({ "user": user })).into_response()
}

async fn update_profile(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.record("PUT /auth/profile");
    if !backend.access_valid(&headers) {
        return expired();
    }
    if body["email"] == json!("taken@example.com") {
        return error(StatusCode::BAD_REQUEST, "Email already exists");
    }
    let mut guard = backend.inner.user.lock().unwrap();
    let user = guard.get_or_insert_with(admin_user);
    for field in ["email", "first_name", "last_name"] {
        if let Some(value) = body.get(field) {
            user[field] = value.clone();
        }
    }
    Json(json!({ "message": "Profile updated successfully", "user": user.clone() })).into_response()
}

async fn change_password(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.record("POST /auth/change-password");
    if !backend.access_valid(&headers) {
        return expired();
    }
    if body["current_password"] != json!(PASSWORD) {
        return error(StatusCode::BAD_REQUEST, "Current password is incorrect");
    }
    Json(json!({ "message": "Password changed successfully" })).into_response()
}

async fn forgot_password(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.record("POST /auth/forgot-password");
    match body["email"].as_str() {
        None | Some("") => error(StatusCode::BAD_REQUEST, "Email is required"),
        Some("admin@example.com") => Json(json!({
            "message": "Password reset token generated",
            "reset_token": "RESET123"
        }))
        .into_response(),
        Some(_) => Json(json!({
            "message": "If the email exists, a reset token has been generated"
        }))
        .into_response(),
    }
}

async fn reset_password(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.record("POST /auth/reset-password");
    if body["token"] != json!("RESET123") {
        return error(StatusCode::BAD_REQUEST, "Invalid or expired token");
    }
    Json(json!({ "message": "Password reset successfully" })).into_response()
}

async fn register(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.record("POST /auth/register");
    if body["username"] == json!(USERNAME) {
        return error(StatusCode::BAD_REQUEST, "Username already exists");
    }
    let user = json!({
        "id": 42,
        "username": body["username"],
        "email": body["email"],
        "first_name": body.get("first_name").cloned().unwrap_or(json!("")),
        "last_name": body.get("last_name").cloned().unwrap_or(json!("")),
        "roles": [{"id": 3, "name": "Employee"}],
        "permissions": []
    });
    (
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully", "user": user })),
    )
        .into_response()
}

async fn tasks(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.record("GET /tasks");
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    backend.inner.task_auth_headers.lock().unwrap().push(auth);

    if backend.inner.reject_all_tasks.load(Ordering::SeqCst) || !backend.access_valid(&headers) {
        return expired();
    }
    Json(json!([{ "id": 1, "title": "Onboard new hire" }])).into_response()
}

async fn list_notifications(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.record("GET /notifications");
    if !backend.access_valid(&headers) {
        return expired();
    }
    let items = backend.inner.notifications.lock().unwrap().clone();
    Json(Value::Array(items)).into_response()
}

async fn clear_notifications(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.record("DELETE /notifications");
    if !backend.access_valid(&headers) {
        return expired();
    }
    backend.inner.notifications.lock().unwrap().clear();
    Json(json!({ "message": "Notifications cleared" })).into_response()
}

async fn mark_read(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    backend.record("PUT /notifications/{id}/read");
    if !backend.access_valid(&headers) {
        return expired();
    }
    let mut items = backend.inner.notifications.lock().unwrap();
    match items.iter_mut().find(|n| n["id"] == json!(id)) {
        Some(item) => {
            item["is_read"] = json!(true);
            Json(item.clone()).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "Not found"),
    }
}

async fn mark_all_read(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.record("PUT /notifications/read-all");
    if !backend.access_valid(&headers) {
        return expired();
    }
    for item in backend.inner.notifications.lock().unwrap().iter_mut() {
        item["is_read"] = json!(true);
    }
    Json(json!({ "message": "All read" })).into_response()
}

pub fn router(backend: Backend) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/token/refresh", post(refresh))
        .route("/auth/profile", get(get_profile).put(update_profile))
        .route("/auth/change-password", post(change_password))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/register", post(register))
        .route("/tasks", get(tasks))
        .route("/notifications", get(list_notifications).delete(clear_notifications))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/{id}/read", put(mark_read))
        .with_state(backend)
}

/// Serve the mock backend on an ephemeral port and return its base URL.
pub async fn spawn(backend: &Backend) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let app = router(backend.clone());
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    format!("http://{}", addr)
}

/// Base URL of a port nothing listens on.
#[allow(dead_code)]
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}

pub fn session(base_url: &str, store: &MemoryTokenStore) -> SessionManager {
    let api = ApiClient::new(base_url, Duration::from_secs(5)).expect("build api client");
    SessionManager::new(api, Arc::new(store.clone()))
}

/// Spawn a backend and a session manager wired to it.
#[allow(dead_code)]
pub async fn setup(store: &MemoryTokenStore) -> (Backend, SessionManager) {
    let backend = Backend::new();
    let base_url = spawn(&backend).await;
    (backend, session(&base_url, store))
}
