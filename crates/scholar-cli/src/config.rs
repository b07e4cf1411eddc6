//! Configuration loading for the Scholar CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const REDACTED: &str = "***REDACTED***";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
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

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Loads `path` when it exists, otherwise the defaults; then applies
    /// environment overrides.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Applies `SCHOLAR_*` overrides read through `lookup`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = present("SCHOLAR_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(secret) = present("SCHOLAR_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(email) = present("SCHOLAR_ADMIN_EMAIL") {
            self.auth.admin_email = email;
        }
        if let Some(password) = present("SCHOLAR_ADMIN_PASSWORD") {
            self.auth.admin_password = Some(password);
        }
        self
    }

    /// Creates a copy with secrets redacted.
    pub fn redact_secrets(&self) -> Self {
        let mut config = self.clone();

        if !config.auth.jwt_secret.is_empty() {
            config.auth.jwt_secret = REDACTED.to_string();
        }
        if config.auth.admin_password.is_some() {
            config.auth.admin_password = Some(REDACTED.to_string());
        }

        config
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds before a request is answered with 408.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub enable_swagger: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            enable_swagger: true,
        }
    }
}

/// Database settings.
///
/// Pool sizing not set here falls back to the `DATABASE_*` environment
/// variables read by the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default)]
    pub max_connections: Option<u32>,

    #[serde(default)]
    pub min_connections: Option<u32>,
}

fn default_database_url() -> String {
    "sqlite://scholar.db?mode=rwc".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: None,
            min_connections: None,
        }
    }
}

/// Token and bootstrap-account settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for access tokens.
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: i64,

    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: i64,

    /// Email of the SuperAdmin created on first start.
    #[serde(default = "default_admin_email")]
    pub admin_email: String,

    /// Password for that account; generated when unset.
    #[serde(default)]
    pub admin_password: Option<String>,
}

fn default_access_ttl() -> i64 {
    15 * 60
}

fn default_refresh_ttl() -> i64 {
    7 * 24 * 60 * 60
}

fn default_admin_email() -> String {
    "admin@scholar.local".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
            admin_email: default_admin_email(),
            admin_password: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit one JSON object per line.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.access_token_ttl_secs, 900);
        assert_eq!(config.auth.refresh_token_ttl_secs, 604_800);
        assert!(config.database.url.starts_with("sqlite:"));
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
server:
  port: 9000
auth:
  jwt_secret: from-file
logging:
  level: debug
  json: true
"#;

        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.jwt_secret, "from-file");
        assert_eq!(config.auth.access_token_ttl_secs, 900);
        assert!(config.logging.json);
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("SCHOLAR_DATABASE_URL", "sqlite::memory:"),
            ("SCHOLAR_JWT_SECRET", "from-env"),
            ("SCHOLAR_ADMIN_PASSWORD", "Sup3rSecret"),
            ("SCHOLAR_ADMIN_EMAIL", "  "),
        ]
        .into_iter()
        .collect();

        let config =
            AppConfig::default().with_env_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.auth.jwt_secret, "from-env");
        assert_eq!(config.auth.admin_password.as_deref(), Some("Sup3rSecret"));
        // blank values are ignored
        assert_eq!(config.auth.admin_email, "admin@scholar.local");
    }

    #[test]
    fn test_redact_secrets() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "secret-key".to_string();
        config.auth.admin_password = Some("Passw0rd".to_string());

        let redacted = config.redact_secrets();
        assert_eq!(redacted.auth.jwt_secret, REDACTED);
        assert_eq!(redacted.auth.admin_password.as_deref(), Some(REDACTED));
        assert_eq!(config.auth.jwt_secret, "secret-key");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database:\n  url: sqlite://school.db\n  max_connections: 4").unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.database.url, "sqlite://school.db");
        assert_eq!(config.database.max_connections, Some(4));

        let missing = AppConfig::load(Path::new("/nonexistent/scholar.yaml"));
        assert!(missing.is_err());
    }
}
