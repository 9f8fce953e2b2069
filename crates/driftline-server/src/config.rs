//! Environment-variable configuration, read with plain `std::env::var`
//! rather than a config crate, matching the teacher's plain
//! struct-of-options style.

use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub store_url: Option<String>,
    pub store_username: Option<String>,
    pub store_password: Option<String>,
    pub store_db_prefix: String,
    pub host: IpAddr,
    pub port: u16,
    pub cors_origin: String,
    pub cors_credentials: bool,
    pub log_level: String,
    pub upload_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            store_url: None,
            store_username: None,
            store_password: None,
            store_db_prefix: "driftline".to_string(),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            cors_origin: "*".to_string(),
            cors_credentials: false,
            log_level: "info".to_string(),
            upload_dir: "./uploads".to_string(),
        }
    }
}

impl ServerConfig {
    /// Reads recognized variables from the environment, falling back to
    /// [`Default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_url: std::env::var("STORE_URL").ok(),
            store_username: std::env::var("STORE_USERNAME").ok(),
            store_password: std::env::var("STORE_PASSWORD").ok(),
            store_db_prefix: std::env::var("STORE_DB_PREFIX").unwrap_or(defaults.store_db_prefix),
            host: std::env::var("HOST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            cors_origin: std::env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            cors_credentials: std::env::var("CORS_CREDENTIALS")
                .ok()
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.cors_credentials),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or(defaults.upload_dir),
        }
    }
}
