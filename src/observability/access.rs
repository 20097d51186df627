//! Access records.
//!
//! One `AccessRecord` is produced per handled request and rendered through an
//! `AccessTemplate`. Templates are plain text with `{field}` tokens:
//!
//! | token | value |
//! |---|---|
//! | `{host}` / `{peer}` | client address |
//! | `{request}` | `GET /path?query HTTP/1.1` |
//! | `{method}`, `{path}`, `{query}` | request line parts |
//! | `{status}` | response status code |
//! | `{length}` | response body length in bytes |
//! | `{duration}` | handling time in milliseconds |
//! | `{agent}`, `{referer}` | request `User-Agent` / `Referer` |
//! | `{process}` | process id |
//! | `{time}` | completion time, seconds since the Unix epoch |
//! | `{<name:req>}`, `{<name:res>}` | request / response header `name` |
//!
//! Unknown tokens and missing values render as `-`.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap, Method, StatusCode, Version};

pub const DEFAULT_TEMPLATE: &str =
    r#"{host} "{request}" {status} {length} "{referer}" "{agent}" {duration}ms"#;

const MISSING: &str = "-";

/// What happened to one request.
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub version: Version,
    pub status: StatusCode,
    pub duration: Duration,
    pub peer: Option<SocketAddr>,
    pub length: Option<u64>,
    pub request_headers: HeaderMap,
    pub response_headers: HeaderMap,
    pub finished: SystemTime,
}

impl AccessRecord {
    /// Value of template field `key`, `-` when unknown or missing.
    pub fn field(&self, key: &str) -> String {
        if let Some(name) = key.strip_prefix('<') {
            let lookup = |headers: &HeaderMap, name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let value = if let Some(name) = name.strip_suffix(":req>") {
                lookup(&self.request_headers, name)
            } else if let Some(name) = name.strip_suffix(":res>") {
                lookup(&self.response_headers, name)
            } else {
                None
            };
            return value.unwrap_or_else(|| MISSING.to_string());
        }

        let value = match key {
            "host" | "peer" => self.peer.map(|p| p.ip().to_string()),
            "method" => Some(self.method.to_string()),
            "path" => Some(self.path.clone()),
            "query" => self.query.clone(),
            "request" => Some(self.request_line()),
            "status" => Some(self.status.as_u16().to_string()),
            "length" => self.length.map(|l| l.to_string()),
            "duration" => Some(format!("{:.3}", self.duration.as_secs_f64() * 1000.0)),
            "agent" => self.header(header::USER_AGENT),
            "referer" => self.header(header::REFERER),
            "process" => Some(std::process::id().to_string()),
            "time" => self
                .finished
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs().to_string()),
            _ => None,
        };
        value.unwrap_or_else(|| MISSING.to_string())
    }

    fn request_line(&self) -> String {
        match &self.query {
            Some(query) => format!("{} {}?{} {:?}", self.method, self.path, query, self.version),
            None => format!("{} {} {:?}", self.method, self.path, self.version),
        }
    }

    fn header(&self, name: header::HeaderName) -> Option<String> {
        self.request_headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Field(String),
}

/// Pre-parsed access log template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTemplate {
    pieces: Vec<Piece>,
}

impl AccessTemplate {
    /// Parse `template`. An unterminated `{` is kept as literal text.
    pub fn parse(template: &str) -> Self {
        let mut pieces = Vec::new();
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            // Header tokens contain `>`, never `}`, so the first `}` closes.
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            if start > 0 {
                pieces.push(Piece::Literal(rest[..start].to_string()));
            }
            pieces.push(Piece::Field(rest[start + 1..start + len].to_string()));
            rest = &rest[start + len + 1..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Literal(rest.to_string()));
        }
        Self { pieces }
    }

    pub fn render(&self, record: &AccessRecord) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Field(key) => out.push_str(&record.field(key)),
            }
        }
        out
    }
}

impl Default for AccessTemplate {
    fn default() -> Self {
        Self::parse(DEFAULT_TEMPLATE)
    }
}
