//! Path template compilation and matching.
//!
//! # Template syntax
//! `/comment/<key:int>`: literal text with placeholders `<name>` or
//! `<name:converter>` (converter defaults to `str`).
//!
//! # Design Decisions
//! - Zero placeholders compile to a literal matcher (string comparison),
//!   anything else to a single anchored regex.
//! - Conversion failure is a match failure: the regex matching is necessary
//!   but not sufficient.
//! - Trailing slashes are significant.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::routing::converter::{Converter, ConverterRegistry, Value};

/// How much of the path a pattern must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The whole path must match.
    Full,
    /// A leading portion of the path must match (mount points).
    Prefix,
}

/// Ordered mapping of placeholder name to typed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, Value)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    /// Insert or replace `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Append every entry of `other`, replacing duplicates.
    pub fn extend(&mut self, other: Params) {
        for (k, v) in other.0 {
            self.insert(k, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON object view, in insertion order.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or_default()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// A successful pattern match.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub params: Params,
    /// Bytes of the path covered by the match.
    pub consumed: usize,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Placeholder { name: String },
}

#[derive(Debug)]
enum Matcher {
    Literal,
    Regex {
        full: Regex,
        prefix: Regex,
        /// Capture group `p{i}` → (placeholder name, converter).
        slots: Vec<(String, Converter)>,
    },
}

/// Compiled, immutable path template.
#[derive(Debug)]
pub struct Pattern {
    template: String,
    segments: Vec<Segment>,
    matcher: Matcher,
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"<(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?::(?P<conv>[A-Za-z_][A-Za-z0-9_]*))?>")
            .expect("placeholder regex is valid")
    })
}

impl Pattern {
    /// Compile `template` against `converters`.
    pub fn compile(template: &str, converters: &ConverterRegistry) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPath {
            path: template.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut slots: Vec<(String, Converter)> = Vec::new();
        let mut source = String::new();
        let mut last = 0;

        for caps in placeholder_regex().captures_iter(template) {
            let whole = caps.get(0).ok_or_else(|| invalid("malformed placeholder"))?;
            let literal = &template[last..whole.start()];
            if literal.contains(['<', '>']) {
                return Err(invalid("malformed placeholder"));
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(literal.to_string()));
                source.push_str(&regex::escape(literal));
            }

            let name = &caps["name"];
            let conv_name = caps.name("conv").map_or("str", |m| m.as_str());
            if slots.iter().any(|(n, _)| n == name) {
                return Err(invalid(&format!("duplicate placeholder `{}`", name)));
            }
            let converter = converters.lookup(conv_name)?.clone();

            source.push_str(&format!("(?P<p{}>{})", slots.len(), converter.pattern()));
            segments.push(Segment::Placeholder {
                name: name.to_string(),
            });
            slots.push((name.to_string(), converter));
            last = whole.end();
        }

        let tail = &template[last..];
        if tail.contains(['<', '>']) {
            return Err(invalid("malformed placeholder"));
        }
        if !tail.is_empty() {
            segments.push(Segment::Literal(tail.to_string()));
            source.push_str(&regex::escape(tail));
        }

        let matcher = if slots.is_empty() {
            Matcher::Literal
        } else {
            let compile = |anchored: String| {
                Regex::new(&anchored).map_err(|source| ConfigError::InvalidPattern {
                    path: template.to_string(),
                    source,
                })
            };
            Matcher::Regex {
                full: compile(format!("^(?:{})$", source))?,
                prefix: compile(format!("^(?:{})", source))?,
                slots,
            }
        };

        Ok(Self {
            template: template.to_string(),
            segments,
            matcher,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.matcher, Matcher::Literal)
    }

    /// Placeholder names in template order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder { name } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match `path`. `None` means no match, including converter rejection.
    pub fn matches(&self, path: &str, mode: MatchMode) -> Option<PatternMatch> {
        match &self.matcher {
            Matcher::Literal => {
                let hit = match mode {
                    MatchMode::Full => path == self.template,
                    MatchMode::Prefix => path.starts_with(&self.template),
                };
                hit.then(|| PatternMatch {
                    params: Params::new(),
                    consumed: self.template.len(),
                })
            }
            Matcher::Regex { full, prefix, slots } => {
                let regex = match mode {
                    MatchMode::Full => full,
                    MatchMode::Prefix => prefix,
                };
                let caps = regex.captures(path)?;
                let mut params = Params::new();
                for (i, (name, converter)) in slots.iter().enumerate() {
                    let text = caps.name(&format!("p{}", i))?.as_str();
                    match converter.convert(text) {
                        Ok(value) => params.insert(name.clone(), value),
                        Err(e) => {
                            tracing::trace!(template = %self.template, error = %e, "Converter rejected capture");
                            return None;
                        }
                    }
                }
                Some(PatternMatch {
                    params,
                    consumed: caps.get(0).map_or(0, |m| m.end()),
                })
            }
        }
    }

    pub fn match_full(&self, path: &str) -> Option<Params> {
        self.matches(path, MatchMode::Full).map(|m| m.params)
    }

    /// Format the template with `params`, the reverse of matching.
    pub fn build(&self, params: &Params) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder { name } => {
                    let value = params.get(name).ok_or_else(|| ConfigError::MissingParameter {
                        path: self.template.clone(),
                        name: name.clone(),
                    })?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(template: &str) -> Pattern {
        Pattern::compile(template, &ConverterRegistry::new()).unwrap()
    }

    #[test]
    fn test_literal_pattern() {
        let pattern = compile("/comment");
        assert!(pattern.is_literal());
        assert_eq!(pattern.match_full("/comment"), Some(Params::new()));
        assert!(pattern.match_full("/comment/").is_none());
        assert!(pattern.matches("/comment/5", MatchMode::Prefix).is_some());
    }

    #[test]
    fn test_empty_template() {
        let pattern = compile("");
        assert!(pattern.match_full("").is_some());
        assert!(pattern.match_full("/").is_none());
        let m = pattern.matches("/anything", MatchMode::Prefix).unwrap();
        assert_eq!(m.consumed, 0);
    }

    #[test]
    fn test_int_placeholder() {
        let pattern = compile("/comment/<key:int>");
        assert!(!pattern.is_literal());
        let params = pattern.match_full("/comment/42").unwrap();
        assert_eq!(params.get("key"), Some(&Value::Int(42)));
        assert!(pattern.match_full("/comment/abc").is_none());
        assert!(pattern.match_full("/comment/-1").is_none());
        assert!(pattern.match_full("/comment/5x").is_none());
    }

    #[test]
    fn test_float_placeholder() {
        let pattern = compile("/price/<amount:float>");
        let params = pattern.match_full("/price/9.75").unwrap();
        assert_eq!(params.get("amount"), Some(&Value::Float(9.75)));
        // Matches the fragment but fails conversion.
        assert!(pattern.match_full("/price/1.2.3").is_none());
        assert!(pattern.match_full("/price/1,5").is_none());

        let built = pattern.build(&params).unwrap();
        assert_eq!(built, "/price/9.75");
        assert_eq!(pattern.match_full(&built), Some(params));
    }

    #[test]
    fn test_default_converter_is_str() {
        let pattern = compile("/user/<name>/posts");
        let params = pattern.match_full("/user/ada/posts").unwrap();
        assert_eq!(params.get_str("name"), Some("ada"));
        assert!(pattern.match_full("/user/a/b/posts").is_none());
    }

    #[test]
    fn test_path_converter_spans_slashes() {
        let pattern = compile("/static/<file:path>");
        let params = pattern.match_full("/static/css/site.css").unwrap();
        assert_eq!(params.get_str("file"), Some("css/site.css"));
    }

    #[test]
    fn test_literal_text_is_escaped() {
        let pattern = compile("/v1.0/<id:int>");
        assert!(pattern.match_full("/v1.0/3").is_some());
        assert!(pattern.match_full("/v1x0/3").is_none());
    }

    #[test]
    fn test_prefix_mode_reports_consumed() {
        let pattern = compile("/api/<version:int>");
        let m = pattern.matches("/api/2/comment", MatchMode::Prefix).unwrap();
        assert_eq!(m.consumed, "/api/2".len());
        assert_eq!(m.params.get_int("version"), Some(2));
    }

    #[test]
    fn test_conversion_failure_is_no_match() {
        let mut registry = ConverterRegistry::new();
        // Regex admits any digits, converter only accepts even numbers.
        registry.register(
            "even",
            Converter::new("[0-9]+", |s| {
                let n: i64 = s.parse().map_err(|e| {
                    crate::routing::converter::ConversionError::new(s, e)
                })?;
                if n % 2 == 0 {
                    Ok(Value::Int(n))
                } else {
                    Err(crate::routing::converter::ConversionError::new(s, "odd"))
                }
            }),
        );
        let pattern = Pattern::compile("/n/<n:even>", &registry).unwrap();
        assert!(pattern.match_full("/n/4").is_some());
        assert!(pattern.match_full("/n/5").is_none());
    }

    #[test]
    fn test_compile_errors() {
        let registry = ConverterRegistry::new();
        assert!(matches!(
            Pattern::compile("/x/<id:hex>", &registry),
            Err(ConfigError::UnknownConverter(_))
        ));
        assert!(matches!(
            Pattern::compile("/x/<id", &registry),
            Err(ConfigError::InvalidPath { .. })
        ));
        assert!(matches!(
            Pattern::compile("/<a>/<a>", &registry),
            Err(ConfigError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_build_round_trip() {
        let pattern = compile("/comment/key=<key:int>");
        let params: Params = [("key", 7i64)].into_iter().collect();
        let path = pattern.build(&params).unwrap();
        assert_eq!(path, "/comment/key=7");
        assert_eq!(pattern.match_full(&path), Some(params));
        assert!(matches!(
            pattern.build(&Params::new()),
            Err(ConfigError::MissingParameter { .. })
        ));
    }
}
