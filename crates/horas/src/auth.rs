//! Password hashing and cookie-backed login sessions.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::month::YearMonth;

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "horas_session";

/// Hash a password with Argon2id into a PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::PasswordHash(e.to_string()))
}

/// Check a password against a stored hash. Malformed hashes are an error,
/// a wrong password is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| AppError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Severity of a flash message, matching the CSS classes of the pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

impl FlashLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
            FlashLevel::Warning => "warning",
            FlashLevel::Danger => "danger",
        }
    }
}

/// One-shot message shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

/// Per-login state
#[derive(Debug, Clone)]
pub struct SessionData {
    pub user_id: i64,
    pub username: String,
    pub selected_month: YearMonth,
    pub flashes: Vec<Flash>,
    expires_at: Instant,
}

/// In-memory session table keyed by random ids
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionData>>,
    lifetime: Duration,
}

impl SessionStore {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lifetime,
        }
    }

    /// Start a session for a freshly authenticated user, returning its id
    pub async fn create(&self, user_id: i64, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let data = SessionData {
            user_id,
            username: username.to_string(),
            selected_month: YearMonth::current(),
            flashes: Vec::new(),
            expires_at: Instant::now() + self.lifetime,
        };

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > Instant::now());
        sessions.insert(id.clone(), data);
        debug!(user_id = user_id, active = sessions.len(), "Session created");
        id
    }

    /// Look up a live session and extend its expiry
    pub async fn touch(&self, id: &str) -> Option<SessionData> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        match sessions.get_mut(id) {
            Some(session) if session.expires_at > now => {
                session.expires_at = now + self.lifetime;
                Some(session.clone())
            }
            Some(_) => {
                sessions.remove(id);
                debug!("Session expired");
                None
            }
            None => None,
        }
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn set_month(&self, id: &str, month: YearMonth) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.selected_month = month;
        }
    }

    pub async fn flash(&self, id: &str, level: FlashLevel, message: impl Into<String>) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.flashes.push(Flash {
                level,
                message: message.into(),
            });
        }
    }

    /// Take all queued flash messages
    pub async fn take_flashes(&self, id: &str) -> Vec<Flash> {
        self.sessions
            .write()
            .await
            .get_mut(id)
            .map(|s| std::mem::take(&mut s.flashes))
            .unwrap_or_default()
    }

    #[cfg(test)]
    async fn expire_now(&self, id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.expires_at = Instant::now();
        }
    }
}
