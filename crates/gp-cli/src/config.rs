//! Configuration loading for the Gatepass CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration, loaded from YAML with env fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env();

        Ok(config)
    }

    /// Applies environment overrides for secrets that should not live in
    /// the config file.
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("GATEPASS_JWT_SECRET") {
            if !secret.is_empty() {
                self.auth.jwt_secret = secret;
            }
        }
        if let Ok(url) = std::env::var("GATEPASS_DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = url;
            }
        }
    }

    /// Creates a copy with secrets redacted for display.
    pub fn redact_secrets(&self) -> Self {
        let mut config = self.clone();
        if !config.auth.jwt_secret.is_empty() {
            config.auth.jwt_secret = "***REDACTED***".to_string();
        }
        // Database URLs can carry credentials
        if config.database.url.contains('@') {
            config.database.url = "***REDACTED***".to_string();
        }
        config
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub enable_swagger: bool,

    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_swagger: true,
            request_timeout_secs: default_timeout(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlite: or postgres:// URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://gatepass.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    20
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret. Prefer GATEPASS_JWT_SECRET over the file.
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_ttl_minutes")]
    pub token_ttl_minutes: i64,
}

fn default_ttl_minutes() -> i64 {
    12 * 60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_minutes: default_ttl_minutes(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.database.url.starts_with("sqlite:"));
        assert_eq!(config.auth.token_ttl_minutes, 720);
    }

    #[test]
    fn parse_yaml() {
        let yaml = r#"
server:
  host: 127.0.0.1
  port: 9090
  enable_swagger: false

database:
  url: postgres://gatepass:secret@db/gatepass
  max_connections: 50

auth:
  jwt_secret: a-very-long-signing-secret-for-hs256
  token_ttl_minutes: 60

logging:
  level: debug
  json_format: true
"#;

        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert!(!config.server.enable_swagger);
        assert_eq!(config.database.max_connections, 50);
        assert_eq!(config.auth.token_ttl_minutes, 60);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn redaction_hides_secrets() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "super-secret".to_string();
        config.database.url = "postgres://user:pass@db/gatepass".to_string();

        let redacted = config.redact_secrets();
        assert_eq!(redacted.auth.jwt_secret, "***REDACTED***");
        assert_eq!(redacted.database.url, "***REDACTED***");

        // A credential-free sqlite URL stays visible
        let plain = AppConfig::default().redact_secrets();
        assert!(plain.database.url.starts_with("sqlite:"));
    }
}
