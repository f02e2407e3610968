//! Configuration validation logic.

use crate::config::schema::Config;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a Config for semantic correctness.
///
/// Rejected configs never replace live state; callers surface the error
/// list to the operator.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(ValidationError(format!(
            "invalid server port: {}",
            config.server.port
        )));
    }

    if config.ssl.enabled {
        if config.ssl.cert_file.is_empty() {
            errors.push(ValidationError(
                "ssl.cert_file is required when SSL is enabled".to_string(),
            ));
        }
        if config.ssl.key_file.is_empty() {
            errors.push(ValidationError(
                "ssl.key_file is required when SSL is enabled".to_string(),
            ));
        }
    }

    for (upstream, backends) in &config.backends {
        if backends.is_empty() {
            errors.push(ValidationError(format!(
                "upstream '{}' has no backends",
                upstream
            )));
        }
        for backend in backends {
            if backend.host.is_empty() {
                errors.push(ValidationError(format!(
                    "backend host is required for upstream '{}'",
                    upstream
                )));
            }
            if backend.port == 0 {
                errors.push(ValidationError(format!(
                    "invalid backend port {} for upstream '{}'",
                    backend.port, upstream
                )));
            }
        }
    }

    for (name, rule) in &config.routing {
        if rule.upstream.is_empty() {
            errors.push(ValidationError(format!(
                "upstream is required for routing rule '{}'",
                name
            )));
        } else if !config.backends.contains_key(&rule.upstream) {
            errors.push(ValidationError(format!(
                "routing rule '{}' references unknown upstream '{}'",
                name, rule.upstream
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
