//! Converter registry owner and pattern cache.
//!
//! # Responsibilities
//! - Own the converter registry (built-ins merged with user converters)
//! - Compile templates once and hand out shared `Pattern`s
//!
//! # Design Decisions
//! - Memoised by template string; patterns are never mutated after creation
//! - Read-only after startup, shared by reference across in-flight requests

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::ConfigError;
use crate::routing::converter::{Converter, ConverterRegistry};
use crate::routing::pattern::Pattern;

#[derive(Debug, Default)]
pub struct Router {
    converters: ConverterRegistry,
    patterns: DashMap<String, Arc<Pattern>>,
}

impl Router {
    /// Router with the built-in converters only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with `converters` merged over the built-ins.
    pub fn with_converters(converters: impl IntoIterator<Item = (String, Converter)>) -> Self {
        let mut registry = ConverterRegistry::new();
        for (name, converter) in converters {
            registry.register(name, converter);
        }
        Self {
            converters: registry,
            patterns: DashMap::new(),
        }
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Compile `template`, or return the cached pattern.
    pub fn pattern(&self, template: &str) -> Result<Arc<Pattern>, ConfigError> {
        if let Some(pattern) = self.patterns.get(template) {
            return Ok(pattern.clone());
        }
        let pattern = Arc::new(Pattern::compile(template, &self.converters)?);
        tracing::debug!(
            template = %template,
            literal = pattern.is_literal(),
            "Compiled path pattern"
        );
        Ok(self
            .patterns
            .entry(template.to_string())
            .or_insert(pattern)
            .clone())
    }

    /// Number of distinct compiled templates.
    pub fn cached(&self) -> usize {
        self.patterns.len()
    }
}
