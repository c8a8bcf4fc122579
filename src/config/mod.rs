//! Configuration module for the Commons backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Fallback signing secret for local development only.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-in-production";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secret used to sign and verify JWT tokens
    pub jwt_secret: String,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Access token lifetime in seconds
    pub access_token_ttl: u64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let jwt_secret =
            env::var("COMMONS_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.to_string());

        let db_path = env::var("COMMONS_DB_PATH")
            .unwrap_or_else(|_| "./data/commons.sqlite".to_string())
            .into();

        let bind_addr = env::var("COMMONS_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid COMMONS_BIND_ADDR format");

        let log_level = env::var("COMMONS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let access_token_ttl = env::var("COMMONS_ACCESS_TOKEN_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24 * 60 * 60);

        let refresh_token_ttl = env::var("COMMONS_REFRESH_TOKEN_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7 * 24 * 60 * 60);

        Self {
            jwt_secret,
            db_path,
            bind_addr,
            log_level,
            access_token_ttl,
            refresh_token_ttl,
        }
    }

    /// Whether the configured secret is the development fallback.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("COMMONS_JWT_SECRET");
        env::remove_var("COMMONS_DB_PATH");
        env::remove_var("COMMONS_BIND_ADDR");
        env::remove_var("COMMONS_LOG_LEVEL");
        env::remove_var("COMMONS_ACCESS_TOKEN_TTL");
        env::remove_var("COMMONS_REFRESH_TOKEN_TTL");

        let config = Config::from_env();

        assert!(config.uses_dev_secret());
        assert_eq!(config.db_path, PathBuf::from("./data/commons.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.access_token_ttl, 24 * 60 * 60);
        assert_eq!(config.refresh_token_ttl, 7 * 24 * 60 * 60);
    }
}
