//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//! - Check that every trusted origin is a well-formed pattern
//! - Detect duplicate source names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::BridgeConfig;
use crate::origin::OriginPattern;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.discovery.max_attempts == 0 {
        errors.push(ValidationError::new("discovery.max_attempts", "must be at least 1"));
    }
    if config.discovery.base_delay_ms > config.discovery.max_delay_ms {
        errors.push(ValidationError::new(
            "discovery.base_delay_ms",
            "must not exceed discovery.max_delay_ms",
        ));
    }
    if config.broker.request_timeout_ms == 0 {
        errors.push(ValidationError::new("broker.request_timeout_ms", "must be greater than 0"));
    }
    if config.noise.throttle_threshold == 0 {
        errors.push(ValidationError::new("noise.throttle_threshold", "must be at least 1"));
    }
    if config.noise.ring_capacity == 0 {
        errors.push(ValidationError::new("noise.ring_capacity", "must be at least 1"));
    }
    if config.transactions.confirmation_poll_ms == 0 {
        errors.push(ValidationError::new("transactions.confirmation_poll_ms", "must be greater than 0"));
    }
    if config.guard.slot_name.trim().is_empty() {
        errors.push(ValidationError::new("guard.slot_name", "must not be empty"));
    }

    for (i, entry) in config.origins.allowed.iter().enumerate() {
        if let Err(e) = OriginPattern::parse(entry) {
            errors.push(ValidationError::new(format!("origins.allowed[{}]", i), e));
        }
    }
    if let Some(parent) = &config.broker.parent_origin {
        if OriginPattern::parse(parent).map(|p| p.is_wildcard()).unwrap_or(true) {
            errors.push(ValidationError::new(
                "broker.parent_origin",
                "must be a single concrete origin",
            ));
        }
    }

    let mut names = HashSet::new();
    for (i, source) in config.sources.iter().enumerate() {
        if !names.insert(source.name.as_str()) {
            errors.push(ValidationError::new(
                format!("sources[{}].name", i),
                format!("duplicate source name '{}'", source.name),
            ));
        }
        if source.rpc_url.parse::<url::Url>().is_err() {
            errors.push(ValidationError::new(format!("sources[{}].rpc_url", i), "invalid URL"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
