//! Admin authentication.
//!
//! The tracker has a single admin account. Requests prove admin rights with
//! a login session cookie, an `X-Admin-Password` header or a `password`
//! query parameter; the last two exist because the web client sends the
//! password it remembered in local storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::app::AppState;
use crate::config::AdminConfig;
use crate::error::{Error, Result};
use crate::extract::Json;
use crate::model::{PasswordChange, User};
use crate::storage::Storage;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "vt_session";

/// Header carrying the admin password.
pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

/// Credential data for login
#[derive(Debug, Deserialize)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

/// Body of `POST /api/admin/verify`
#[derive(Debug, Deserialize)]
pub struct PasswordBody {
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct PasswordQuery {
    password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthStatus {
    is_authenticated: bool,
}

/// An authenticated login session
#[derive(Debug, Clone)]
pub struct Session {
    /// Username of the authenticated user
    pub username: String,

    /// Time when the session expires
    pub expires_at: Instant,
}

/// Live login sessions, keyed by random session id
#[derive(Debug)]
pub struct Sessions {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl Sessions {
    /// Empty session table whose sessions live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a new session for `username` and return its id.
    ///
    /// Expired sessions are dropped on the way.
    pub fn create(&self, username: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let now = Instant::now();
        let session = Session {
            username: username.to_string(),
            expires_at: now + self.ttl,
        };

        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session_id.clone(), session);

        session_id
    }

    /// The username for a live session, if any.
    pub fn validate(&self, session_id: &str) -> Option<String> {
        let sessions = self
            .sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions
            .get(session_id)
            .filter(|s| s.expires_at > Instant::now())
            .map(|s| s.username.clone())
    }

    /// End a session.
    pub fn remove(&self, session_id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(session_id);
    }
}

/// Hash a password using Argon2
///
/// # Errors
/// * Returns [`Error::PasswordHash`] if hashing fails
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| Error::PasswordHash)
}

/// Verify a password against a stored hash
///
/// # Errors
/// * Returns [`Error::PasswordHash`] if the stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| Error::PasswordHash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Create the admin account with the configured default password if it is
/// missing.
///
/// # Errors
/// * Returns an error if the store or the hasher fails
pub fn ensure_admin(store: &dyn Storage, admin: &AdminConfig) -> Result<User> {
    if let Some(user) = store.user_by_username(&admin.username)? {
        return Ok(user);
    }
    let user = store.create_user(&admin.username, &hash_password(&admin.default_password)?)?;
    tracing::warn!(
        username = %admin.username,
        "created admin account with the default password; change it from the admin panel"
    );
    Ok(user)
}

/// Check whether `password` is the admin password.
///
/// # Errors
/// * Returns an error if the store fails or the stored hash is malformed
pub fn verify_admin_password(state: &AppState, password: &str) -> Result<bool> {
    match state.store.user_by_username(&state.config.admin.username)? {
        Some(user) => verify_password(password, &user.password_hash),
        None => Ok(false),
    }
}

/// Whether the request carries admin rights.
///
/// Checked in order: session cookie, `X-Admin-Password` header, `password`
/// query parameter.
///
/// # Errors
/// * Returns an error if the admin record cannot be read
pub fn is_admin_request(state: &AppState, headers: &HeaderMap, uri: &Uri) -> Result<bool> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state.sessions.validate(cookie.value()).is_some() {
            return Ok(true);
        }
    }

    if let Some(password) = headers
        .get(ADMIN_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return verify_admin_password(state, password);
    }

    if let Ok(Query(PasswordQuery {
        password: Some(password),
    })) = Query::<PasswordQuery>::try_from_uri(uri)
    {
        if !password.is_empty() {
            return verify_admin_password(state, &password);
        }
    }

    Ok(false)
}

/// Admin gate middleware
///
/// Passes the request through when [`is_admin_request`] accepts it and
/// answers 401 otherwise.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match is_admin_request(&state, request.headers(), request.uri()) {
        Ok(true) => next.run(request).await,
        Ok(false) => Error::Unauthorized("Unauthorized".to_string()).into_response(),
        Err(e) => e.into_response(),
    }
}

fn session_cookie(value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie
}

/// Handle login requests
///
/// Validates the credentials and sets the session cookie.
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(credentials): Json<UserCredentials>,
) -> Result<(CookieJar, Json<Value>)> {
    let user = state.store.user_by_username(&credentials.username)?;
    let valid = match &user {
        Some(user) => verify_password(&credentials.password, &user.password_hash)?,
        None => false,
    };
    if !valid {
        tracing::info!(username = %credentials.username, "rejected login");
        return Err(Error::Unauthorized("Invalid credentials".to_string()));
    }

    let session_id = state.sessions.create(&credentials.username);
    tracing::info!(username = %credentials.username, "admin logged in");
    Ok((
        jar.add(session_cookie(session_id)),
        Json(json!({ "message": "Login successful" })),
    ))
}

/// Handle logout
///
/// Ends the session named by the cookie, if any, and clears the cookie.
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    (
        jar.remove(session_cookie(String::new())),
        Json(json!({ "message": "Logout successful" })),
    )
}

/// Report whether the session cookie is live
pub async fn auth_status(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let is_authenticated = jar
        .get(SESSION_COOKIE)
        .and_then(|c| state.sessions.validate(c.value()))
        .is_some();
    Json(AuthStatus { is_authenticated })
}

/// Check a password typed into the admin dialog
pub async fn handle_verify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PasswordBody>,
) -> Result<Json<Value>> {
    if verify_admin_password(&state, &body.password)? {
        Ok(Json(json!({ "verified": true })))
    } else {
        Err(Error::Unauthorized("Invalid admin password".to_string()))
    }
}

/// Change the admin password
///
/// Runs behind [`require_admin`]; the current password must still be given.
pub async fn handle_change_password(
    State(state): State<Arc<AppState>>,
    Json(change): Json<PasswordChange>,
) -> Result<Json<Value>> {
    change.validate(state.config.admin.min_password_len)?;

    let user = state
        .store
        .user_by_username(&state.config.admin.username)?
        .ok_or(Error::NotFound("Admin user"))?;
    if !verify_password(&change.current_password, &user.password_hash)? {
        return Err(Error::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    state
        .store
        .set_user_password(user.id, &hash_password(&change.new_password)?)?;
    tracing::info!("admin password changed");
    Ok(Json(json!({ "message": "Password changed successfully" })))
}
