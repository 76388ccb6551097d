//! Configuration validation before server start.

use colored::Colorize;

use crate::config::AppConfig;

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One validation finding.
#[derive(Debug, Clone)]
pub struct Finding {
    pub severity: Severity,
    pub field: &'static str,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub findings: Vec<Finding>,
}

impl ValidationResult {
    fn error(&mut self, field: &'static str, message: impl Into<String>) {
        self.findings.push(Finding {
            severity: Severity::Error,
            field,
            message: message.into(),
        });
    }

    fn warning(&mut self, field: &'static str, message: impl Into<String>) {
        self.findings.push(Finding {
            severity: Severity::Warning,
            field,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.severity == Severity::Warning)
    }

    /// Prints the findings with severity coloring.
    pub fn print(&self) {
        for finding in &self.findings {
            match finding.severity {
                Severity::Error => {
                    println!("  {} {}: {}", "error".red().bold(), finding.field, finding.message);
                }
                Severity::Warning => {
                    println!(
                        "  {} {}: {}",
                        "warning".yellow().bold(),
                        finding.field,
                        finding.message
                    );
                }
            }
        }
        if self.findings.is_empty() {
            println!("  {}", "no findings".green());
        }
    }
}

/// Validates an [`AppConfig`].
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        // Database URL scheme
        let url = &config.database.url;
        if !(url.starts_with("sqlite:")
            || url.starts_with("postgres://")
            || url.starts_with("postgresql://"))
        {
            result.error(
                "database.url",
                format!("Unsupported scheme in '{url}'; expected sqlite: or postgres://"),
            );
        }
        if config.database.max_connections == 0 {
            result.error("database.max_connections", "Must be at least 1");
        }

        // JWT secret
        if config.auth.jwt_secret.is_empty() {
            result.error(
                "auth.jwt_secret",
                "Missing; set it in the config file or via GATEPASS_JWT_SECRET",
            );
        } else if config.auth.jwt_secret.len() < 32 {
            result.warning(
                "auth.jwt_secret",
                "Shorter than 32 characters; consider a longer secret",
            );
        }

        if config.auth.token_ttl_minutes < 5 {
            result.warning(
                "auth.token_ttl_minutes",
                "Very short token lifetime; clients will re-login frequently",
            );
        } else if config.auth.token_ttl_minutes > 24 * 60 {
            result.warning(
                "auth.token_ttl_minutes",
                "Tokens outliving a day weaken account disabling",
            );
        }

        // Logging level
        if !["trace", "debug", "info", "warn", "error"]
            .contains(&config.logging.level.to_lowercase().as_str())
        {
            result.error(
                "logging.level",
                format!("Unknown level '{}'", config.logging.level),
            );
        }

        result
    }
}
