//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check converter declarations (names, uniqueness, regex fragments)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address `{0}`")]
    InvalidBindAddress(String),

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("body limit must be greater than zero")]
    ZeroBodyLimit,

    #[error("service prefix `{0}` must be empty or start with `/`")]
    InvalidPrefix(String),

    #[error("invalid converter name `{0}`")]
    InvalidConverterName(String),

    #[error("converter `{0}` declared more than once")]
    DuplicateConverter(String),

    #[error("converter `{name}` has an invalid pattern: {reason}")]
    InvalidConverterPattern { name: String, reason: String },
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }
    if config.listener.body_limit_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    let prefix = &config.service.prefix;
    if !prefix.is_empty() && !prefix.starts_with('/') {
        errors.push(ValidationError::InvalidPrefix(prefix.clone()));
    }

    let mut seen = HashSet::new();
    for converter in &config.converters {
        if !is_identifier(&converter.name) {
            errors.push(ValidationError::InvalidConverterName(converter.name.clone()));
        }
        if !seen.insert(converter.name.as_str()) {
            errors.push(ValidationError::DuplicateConverter(converter.name.clone()));
        }
        if let Err(e) = regex::Regex::new(&converter.pattern) {
            errors.push(ValidationError::InvalidConverterPattern {
                name: converter.name.clone(),
                reason: e.to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
