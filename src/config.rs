// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and held in memory for the life of
//! the process; nothing here is mutated after `from_env` returns.

use std::env;
use std::time::Duration;

/// Minimum length, in bytes, for the JWT and encryption secrets.
pub const MIN_SECRET_LEN: usize = 32;

/// Which reminders backend the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamMode {
    /// Real iCloud web services.
    ICloud,
    /// In-process account store (local development).
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Deployment environment name, echoed by `/health`
    pub environment: String,
    /// Server port
    pub port: u16,
    /// SQLite connection URL for the credential store
    pub database_url: String,
    /// Origins allowed by CORS; empty means any origin
    pub allowed_origins: Vec<String>,

    // --- Upstream ---
    pub upstream_mode: UpstreamMode,
    /// Apple ID sign-in endpoint
    pub icloud_auth_endpoint: String,
    /// iCloud setup (account login) endpoint
    pub icloud_setup_endpoint: String,
    /// Timeout applied to every upstream HTTP call
    pub upstream_timeout: Duration,

    // --- Rate limits (requests per minute per client) ---
    pub auth_rate_limit: u32,
    pub api_rate_limit: u32,
    /// Identify clients by `X-Forwarded-For` instead of the socket peer.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_proxy_headers: bool,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Input keying material for credential encryption (raw bytes)
    pub encryption_key: Vec<u8>,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            environment: "test".to_string(),
            port: 5000,
            database_url: "sqlite::memory:".to_string(),
            allowed_origins: Vec::new(),
            upstream_mode: UpstreamMode::Memory,
            icloud_auth_endpoint: "http://127.0.0.1:9/appleauth/auth".to_string(),
            icloud_setup_endpoint: "http://127.0.0.1:9/setup/ws/1".to_string(),
            upstream_timeout: Duration::from_secs(5),
            auth_rate_limit: 1000,
            api_rate_limit: 1000,
            trust_proxy_headers: false,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!!".to_vec(),
            encryption_key: b"test_encryption_key_32_bytes_min".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                let path = env::var("DATABASE_PATH").unwrap_or_else(|_| "users.db".to_string());
                format!("sqlite://{}", path)
            }
        };

        let upstream_mode = match env::var("REMINDERS_UPSTREAM")
            .unwrap_or_else(|_| "icloud".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "icloud" => UpstreamMode::ICloud,
            "memory" => UpstreamMode::Memory,
            _ => return Err(ConfigError::Invalid("REMINDERS_UPSTREAM")),
        };

        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            port: parse_or("PORT", 5000)?,
            database_url,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),

            upstream_mode,
            icloud_auth_endpoint: env::var("ICLOUD_AUTH_ENDPOINT")
                .unwrap_or_else(|_| "https://idmsa.apple.com/appleauth/auth".to_string()),
            icloud_setup_endpoint: env::var("ICLOUD_SETUP_ENDPOINT")
                .unwrap_or_else(|_| "https://setup.icloud.com/setup/ws/1".to_string()),
            upstream_timeout: Duration::from_secs(parse_or("UPSTREAM_TIMEOUT_SECS", 30)?),

            auth_rate_limit: parse_or("RATE_LIMIT_AUTH_PER_MINUTE", 10)?,
            api_rate_limit: parse_or("RATE_LIMIT_API_PER_MINUTE", 60)?,
            trust_proxy_headers: parse_or("TRUST_PROXY_HEADERS", false)?,

            jwt_signing_key: secret("JWT_SECRET_KEY")?,
            encryption_key: secret("ENCRYPTION_KEY")?,
        })
    }
}

/// Read a required secret and enforce the minimum length.
fn secret(name: &'static str) -> Result<Vec<u8>, ConfigError> {
    let value = env::var(name).map_err(|_| ConfigError::Missing(name))?;
    let value = value.trim();
    if value.len() < MIN_SECRET_LEN {
        return Err(ConfigError::TooShort(name, MIN_SECRET_LEN));
    }
    Ok(value.as_bytes().to_vec())
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("{0} must be at least {1} bytes")]
    TooShort(&'static str, usize),
}
