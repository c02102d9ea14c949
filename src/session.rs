// src/session.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::config::Credentials;

/// Sessions are treated as expired slightly early so a token that would die
/// mid-cycle is refreshed up front.
const EXPIRY_SKEW_SECS: i64 = 30;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credentials are not configured")]
    MissingCredentials,
    #[error("remote rejected credentials (status {status})")]
    Rejected { status: u16 },
    #[error("auth transport failure: {0}")]
    Transport(String),
    #[error("malformed login response: {0}")]
    Malformed(String),
}

/// Authenticated handle with a validity window. Only the session manager
/// creates these; other components receive them by value for the one cycle.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(EXPIRY_SKEW_SECS) > now
    }
}

/// Seam between session bookkeeping and the HTTP leg of login, so the
/// one-re-login rule stays testable without a live dashboard.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    async fn login(&self, creds: &Credentials) -> Result<Session, AuthError>;
}

/// Owns credentials and the active-session policy. Re-authentication happens
/// at most once per `ensure_valid` call; a second failure propagates and the
/// poll scheduler governs the outer retry cadence.
pub struct SessionManager {
    creds: Credentials,
    transport: Box<dyn AuthTransport>,
}

impl SessionManager {
    pub fn new(creds: Credentials, transport: Box<dyn AuthTransport>) -> Self {
        Self { creds, transport }
    }

    pub async fn login(&self) -> Result<Session, AuthError> {
        if !self.creds.is_complete() {
            return Err(AuthError::MissingCredentials);
        }
        self.transport.login(&self.creds).await
    }

    /// Returns the same session when still valid, otherwise performs exactly
    /// one re-login.
    pub async fn ensure_valid(&self, session: Option<Session>) -> Result<Session, AuthError> {
        if let Some(s) = session {
            if s.is_valid_at(Utc::now()) {
                return Ok(s);
            }
            tracing::debug!("session expired, re-authenticating");
        }
        self.login().await
    }
}

// --- tolerant variants of the login response ---

#[derive(Debug, Deserialize)]
struct LoginBody {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LoginAny {
    Flat(LoginBody),
    Wrapped { data: LoginBody },
}

impl LoginAny {
    fn into_body(self) -> LoginBody {
        match self {
            LoginAny::Flat(b) => b,
            LoginAny::Wrapped { data } => data,
        }
    }
}

pub struct HttpAuthTransport {
    base_url: String,
    client: reqwest::Client,
    timeout: std::time::Duration,
}

impl HttpAuthTransport {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl AuthTransport for HttpAuthTransport {
    async fn login(&self, creds: &Credentials) -> Result<Session, AuthError> {
        let url = format!("{}/api/auth/login", self.base_url);
        let body = serde_json::json!({
            "username": creds.username,
            "password": creds.password(),
        });

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(AuthError::Transport(format!("login returned {status}")));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let any: LoginAny =
            serde_json::from_str(&text).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let body = any.into_body();

        Ok(Session {
            token: body.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(body.expires_in.max(0)),
        })
    }
}
