//! Placeholder converters.
//!
//! A converter is a named pair of a regex fragment (what text a placeholder
//! may capture) and a conversion function (how that text becomes a typed
//! `Value`). The registry always contains the built-ins `str`, `int`,
//! `float` and `path`; user converters override them by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ConfigError;

/// A typed path parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

/// A converter rejected the captured text.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cannot convert {input:?}: {reason}")]
pub struct ConversionError {
    pub input: String,
    pub reason: String,
}

impl ConversionError {
    pub fn new(input: &str, reason: impl fmt::Display) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

type ConvertFn = dyn Fn(&str) -> Result<Value, ConversionError> + Send + Sync;

/// Immutable (regex fragment, convert function) pair.
#[derive(Clone)]
pub struct Converter {
    pattern: String,
    convert: Arc<ConvertFn>,
}

impl Converter {
    pub fn new<F>(pattern: impl Into<String>, convert: F) -> Self
    where
        F: Fn(&str) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        Self {
            pattern: pattern.into(),
            convert: Arc::new(convert),
        }
    }

    /// Identity conversion into `Value::Str`.
    pub fn string(pattern: impl Into<String>) -> Self {
        Self::new(pattern, |s| Ok(Value::Str(s.to_string())))
    }

    /// Decimal integer conversion.
    pub fn integer(pattern: impl Into<String>) -> Self {
        Self::new(pattern, |s| {
            s.parse::<i64>()
                .map(Value::Int)
                .map_err(|e| ConversionError::new(s, e))
        })
    }

    pub fn float(pattern: impl Into<String>) -> Self {
        Self::new(pattern, |s| {
            s.parse::<f64>()
                .map(Value::Float)
                .map_err(|e| ConversionError::new(s, e))
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn convert(&self, input: &str) -> Result<Value, ConversionError> {
        (self.convert)(input)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Name → converter mapping owned by a `Router`.
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    converters: HashMap<String, Converter>,
}

impl ConverterRegistry {
    /// Registry holding only the built-ins.
    pub fn new() -> Self {
        let mut converters = HashMap::new();
        converters.insert("str".to_string(), Converter::string("[^<>/]+"));
        converters.insert("int".to_string(), Converter::integer("[0-9]+"));
        converters.insert("float".to_string(), Converter::float("[0-9.]+"));
        converters.insert("path".to_string(), Converter::string("[^<>]+"));
        Self { converters }
    }

    /// Add or override a converter.
    pub fn register(&mut self, name: impl Into<String>, converter: Converter) {
        self.converters.insert(name.into(), converter);
    }

    pub fn lookup(&self, name: &str) -> Result<&Converter, ConfigError> {
        self.converters
            .get(name)
            .ok_or_else(|| ConfigError::UnknownConverter(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
