//! Startup validation for the Scholar configuration.
//!
//! Errors stop `serve`; warnings are printed and the server starts anyway.

use crate::config::AppConfig;
use colored::Colorize;
use scholar_core::validate_password_strength;
use scholar_observability::LoggingConfig;

/// Secrets shorter than this are accepted with a warning.
const RECOMMENDED_SECRET_LEN: usize = 32;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Problems that prevent startup.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Prints the validation result to the console.
    pub fn print(&self) {
        if !self.warnings.is_empty() {
            println!();
            println!("{}", "Configuration Warnings:".yellow().bold());
            for warning in &self.warnings {
                println!("  {} {}", "⚠".yellow(), warning);
            }
        }

        if !self.errors.is_empty() {
            println!();
            println!("{}", "Configuration Errors:".red().bold());
            for error in &self.errors {
                println!("  {} {}", "✗".red(), error);
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            println!("  {} Configuration OK", "✓".green());
        }
    }
}

/// Validates application configuration before startup.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_server(config, &mut result);
        Self::validate_database(config, &mut result);
        Self::validate_auth(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_server(config: &AppConfig, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error("server.port must be between 1 and 65535");
        }
        if config.server.request_timeout_secs == 0 {
            result.add_error("server.request_timeout_secs must be greater than zero");
        }
    }

    fn validate_database(config: &AppConfig, result: &mut ValidationResult) {
        let url = &config.database.url;
        if !url.starts_with("sqlite:") {
            result.add_error(format!(
                "Unsupported database URL '{}'. Only sqlite: URLs are supported.",
                url
            ));
        } else if url.contains(":memory:") || url.contains("mode=memory") {
            result.add_warning("Database is in-memory; all data is lost on shutdown.");
        }

        if let (Some(max), Some(min)) = (
            config.database.max_connections,
            config.database.min_connections,
        ) {
            if min > max {
                result.add_error(format!(
                    "database.min_connections ({}) exceeds database.max_connections ({})",
                    min, max
                ));
            }
        }
        if config.database.max_connections == Some(0) {
            result.add_error("database.max_connections must be at least 1");
        }
    }

    fn validate_auth(config: &AppConfig, result: &mut ValidationResult) {
        let auth = &config.auth;

        if auth.jwt_secret.trim().is_empty() {
            result.add_error(
                "auth.jwt_secret is not set. Set it in the config file or SCHOLAR_JWT_SECRET.",
            );
        } else if auth.jwt_secret.len() < RECOMMENDED_SECRET_LEN {
            result.add_warning(format!(
                "auth.jwt_secret is shorter than {} characters.",
                RECOMMENDED_SECRET_LEN
            ));
        }

        if auth.access_token_ttl_secs <= 0 || auth.refresh_token_ttl_secs <= 0 {
            result.add_error("Token lifetimes must be positive");
        } else if auth.access_token_ttl_secs >= auth.refresh_token_ttl_secs {
            result.add_warning(
                "auth.access_token_ttl_secs is not shorter than auth.refresh_token_ttl_secs",
            );
        }

        if !auth.admin_email.contains('@') {
            result.add_error(format!(
                "auth.admin_email '{}' is not an email address",
                auth.admin_email
            ));
        }

        if let Some(password) = &auth.admin_password {
            for problem in validate_password_strength(password) {
                result.add_error(format!("auth.admin_password: {}", problem));
            }
        }
    }

    fn validate_logging(config: &AppConfig, result: &mut ValidationResult) {
        if let Err(e) = LoggingConfig::from_settings(&config.logging.level, "pretty") {
            result.add_error(format!("logging.level: {}", e));
        }
    }
}
