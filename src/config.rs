// src/config.rs
use std::fmt;
use std::time::Duration;

use anyhow::{bail, Result};

/// Opaque username/secret pair. Held only by the session manager and never
/// logged; `Debug` redacts the secret.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Process configuration, constructed once at startup and passed in
/// explicitly. Absent credentials are a startup error, not a per-cycle one.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub credentials: Credentials,
    pub poll_interval: Duration,
    pub failure_backoff: Duration,
    pub request_timeout: Duration,
    pub bind_addr: String,
    pub include_quota_events: bool,
}

const DEFAULT_BASE_URL: &str = "https://api.purespectrum.com";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 120;
const DEFAULT_FAILURE_BACKOFF_SECS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let username = std::env::var("PURESPECTRUM_USERNAME").unwrap_or_default();
        let password = std::env::var("PURESPECTRUM_PASSWORD").unwrap_or_default();
        let credentials = Credentials::new(username, password);
        if !credentials.is_complete() {
            bail!("PURESPECTRUM_USERNAME / PURESPECTRUM_PASSWORD are not configured");
        }

        let base_url = std::env::var("DASHBOARD_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let port: u16 = env_parsed("PORT").unwrap_or(8000);

        Ok(Self {
            base_url,
            credentials,
            poll_interval: Duration::from_secs(
                env_parsed("POLL_INTERVAL_SECS").unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
            failure_backoff: Duration::from_secs(
                env_parsed("FAILURE_BACKOFF_SECS").unwrap_or(DEFAULT_FAILURE_BACKOFF_SECS),
            ),
            request_timeout: Duration::from_secs(
                env_parsed("REQUEST_TIMEOUT_SECS").unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            bind_addr: format!("0.0.0.0:{port}"),
            include_quota_events: std::env::var("QUOTA_EVENTS")
                .map(|v| v == "1")
                .unwrap_or(false),
        })
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn debug_redacts_password() {
        let c = Credentials::new("alice", "hunter2");
        let s = format!("{c:?}");
        assert!(s.contains("alice"));
        assert!(!s.contains("hunter2"));
        assert!(s.contains("<redacted>"));
    }

    #[serial_test::serial]
    #[test]
    fn missing_credentials_fail_at_startup() {
        env::remove_var("PURESPECTRUM_USERNAME");
        env::remove_var("PURESPECTRUM_PASSWORD");
        assert!(AppConfig::from_env().is_err());
    }

    #[serial_test::serial]
    #[test]
    fn defaults_and_overrides() {
        env::set_var("PURESPECTRUM_USERNAME", "alice");
        env::set_var("PURESPECTRUM_PASSWORD", "s3cret");
        env::set_var("DASHBOARD_BASE_URL", "https://example.test/");
        env::set_var("POLL_INTERVAL_SECS", "15");
        env::remove_var("FAILURE_BACKOFF_SECS");

        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.base_url, "https://example.test");
        assert_eq!(cfg.poll_interval, Duration::from_secs(15));
        assert_eq!(cfg.failure_backoff, Duration::from_secs(300));
        assert!(!cfg.include_quota_events);

        env::remove_var("PURESPECTRUM_USERNAME");
        env::remove_var("PURESPECTRUM_PASSWORD");
        env::remove_var("DASHBOARD_BASE_URL");
        env::remove_var("POLL_INTERVAL_SECS");
    }
}
