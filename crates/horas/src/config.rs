//! Configuration loading from environment variables.

use anyhow::{Context, Result};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATABASE: &str = "horas.db";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SESSION_MINUTES: u64 = 30;

/// Runtime settings; command-line flags override these
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database: PathBuf,
    pub bind: IpAddr,
    pub port: u16,
    pub session_lifetime: Duration,
    /// Account seeded by `init-db` when both parts are set
    pub admin: Option<AdminAccount>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminAccount {
    pub username: String,
    pub password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            bind: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_PORT,
            session_lifetime: Duration::from_secs(DEFAULT_SESSION_MINUTES * 60),
            admin: None,
        }
    }
}

impl Config {
    /// Load settings from the environment, reading a `.env` file first if present.
    ///
    /// Recognized variables: `HORAS_DATABASE`, `HORAS_BIND`, `HORAS_PORT`,
    /// `HORAS_SESSION_MINUTES`, `HORAS_ADMIN_USER` and `HORAS_ADMIN_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("HORAS_DATABASE") {
            config.database = PathBuf::from(path);
        }
        if let Some(bind) = get("HORAS_BIND") {
            config.bind = bind
                .trim()
                .parse()
                .with_context(|| format!("HORAS_BIND is not an IP address: {}", bind))?;
        }
        if let Some(port) = get("HORAS_PORT") {
            config.port = port
                .trim()
                .parse()
                .with_context(|| format!("HORAS_PORT is not a valid port: {}", port))?;
        }
        if let Some(minutes) = get("HORAS_SESSION_MINUTES") {
            let minutes: u64 = minutes.trim().parse().with_context(|| {
                format!("HORAS_SESSION_MINUTES is not a number: {}", minutes)
            })?;
            if minutes == 0 {
                anyhow::bail!("HORAS_SESSION_MINUTES must be at least 1");
            }
            config.session_lifetime = Duration::from_secs(minutes * 60);
        }

        config.admin = match (get("HORAS_ADMIN_USER"), get("HORAS_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminAccount {
                username: username.trim().to_string(),
                password,
            }),
            _ => None,
        };

        Ok(config)
    }
}
