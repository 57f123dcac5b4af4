//! Configuration validation logic.

use std::collections::HashSet;

use url::Url;

use crate::config::schema::Config;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a parsed [`Config`] for semantic correctness.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.services.is_empty() {
        errors.push(ValidationError(
            "at least one service must be defined".to_string(),
        ));
    }

    let mut names: HashSet<&str> = HashSet::new();
    let mut default_count = 0;

    for (i, svc) in config.services.iter().enumerate() {
        if svc.name.is_empty() {
            errors.push(ValidationError(format!("service at index {i} has no name")));
        } else if !names.insert(svc.name.as_str()) {
            errors.push(ValidationError(format!(
                "duplicate service name: {}",
                svc.name
            )));
        }

        if svc.target.is_empty() {
            errors.push(ValidationError(format!(
                "service {} has no target",
                display_name(svc.name.as_str(), i)
            )));
        } else {
            match Url::parse(&svc.target) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => errors.push(ValidationError(format!(
                    "service {} target must be http or https, got {}",
                    display_name(svc.name.as_str(), i),
                    url.scheme()
                ))),
                Err(e) => errors.push(ValidationError(format!(
                    "invalid target URL for service {}: {e}",
                    display_name(svc.name.as_str(), i)
                ))),
            }
        }

        if svc.default {
            default_count += 1;
        }
    }

    if default_count > 1 {
        errors.push(ValidationError(
            "multiple default services defined".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn display_name(name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("at index {index}")
    } else {
        name.to_string()
    }
}
