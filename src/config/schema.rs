//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::routing::Converter;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Where the service is mounted.
    pub service: MountConfig,

    /// Logging and access log settings.
    pub logging: LoggingConfig,

    /// Extra path converters, overriding built-ins by name.
    pub converters: Vec<ConverterConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:9000").
    pub bind_address: String,

    /// Slow-request timeout, enforced by the HTTP engine.
    pub request_timeout_secs: u64,

    /// Maximum buffered request body.
    pub body_limit_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9000".to_string(),
            request_timeout_secs: 5,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

/// Service mount point.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MountConfig {
    /// Path prefix for every route (e.g., "/api"). Empty mounts at root.
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,

    pub format: LogFormat,

    /// Emit one access record per request.
    pub access_log: bool,

    /// Access record template; see `observability::access`.
    pub access_template: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "switchyard=info,tower_http=info".to_string(),
            format: LogFormat::Full,
            access_log: true,
            access_template: None,
        }
    }
}

/// Conversion applied by a configured converter.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    Str,
    Int,
    Float,
    Path,
}

/// A converter declared in configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConverterConfig {
    /// Name used in templates: `<id:name>`.
    pub name: String,

    /// Regex fragment matched by the placeholder.
    pub pattern: String,

    pub kind: ConverterKind,
}

impl ConverterConfig {
    pub fn to_converter(&self) -> Converter {
        match self.kind {
            ConverterKind::Str | ConverterKind::Path => Converter::string(self.pattern.clone()),
            ConverterKind::Int => Converter::integer(self.pattern.clone()),
            ConverterKind::Float => Converter::float(self.pattern.clone()),
        }
    }
}
