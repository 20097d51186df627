//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     template "/comment/<key:int>"
//!     → router.rs (converter lookup, memoised compile)
//!     → pattern.rs (literal or anchored regex matcher)
//!     → table.rs (ordered routes + nested mounts)
//!
//! Incoming Request (method, path)
//!     → table.rs resolve (registration order, first full match wins)
//!     → Return: RouteMatch { endpoint, params } or Miss
//! ```
//!
//! # Design Decisions
//! - Patterns compiled at startup, immutable at runtime
//! - Conversion failure is a matching failure, never a handler error
//! - 404 and 405 are distinguished; 405 carries the union of allowed methods

pub mod converter;
pub mod pattern;
pub mod router;
pub mod table;

pub use converter::{ConversionError, Converter, ConverterRegistry, Value};
pub use pattern::{MatchMode, Params, Pattern, PatternMatch};
pub use router::Router;
pub use table::{RouteMatch, RouteNames, RouteTable};

use axum::http::Method;

use crate::error::{ConfigError, HttpError};

/// Why a request did not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Miss {
    /// No path matched.
    NotFound,
    /// A path matched but none of its routes accept `method`.
    MethodNotAllowed { method: Method, allowed: Vec<Method> },
}

impl Miss {
    /// Combine two misses; method-not-allowed wins and unions its methods.
    pub fn merge(self, other: Miss) -> Miss {
        match (self, other) {
            (Miss::NotFound, other) => other,
            (this, Miss::NotFound) => this,
            (
                Miss::MethodNotAllowed { method, mut allowed },
                Miss::MethodNotAllowed { allowed: more, .. },
            ) => {
                for m in more {
                    if !allowed.contains(&m) {
                        allowed.push(m);
                    }
                }
                Miss::MethodNotAllowed { method, allowed }
            }
        }
    }

    pub fn into_http_error(self) -> HttpError {
        match self {
            Miss::NotFound => HttpError::not_found(),
            Miss::MethodNotAllowed { method, allowed } => {
                HttpError::method_not_allowed(&method, &allowed)
            }
        }
    }
}

/// Accepted HTTP methods. Empty means any method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSet(Vec<Method>);

impl MethodSet {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn only(method: Method) -> Self {
        Self(vec![method])
    }

    /// Parse method names, case-insensitively.
    pub fn parse<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for name in names {
            let name = name.as_ref();
            let method = Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                .map_err(|_| ConfigError::InvalidMethod(name.to_string()))?;
            set.insert(method);
        }
        Ok(set)
    }

    pub fn insert(&mut self, method: Method) {
        if !self.0.contains(&method) {
            self.0.push(method);
        }
    }

    pub fn is_any(&self) -> bool {
        self.0.is_empty()
    }

    pub fn accepts(&self, method: &Method) -> bool {
        self.is_any()
            || self
                .0
                .iter()
                .any(|m| m.as_str().eq_ignore_ascii_case(method.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<Method> {
        self.0.clone()
    }
}

impl FromIterator<Method> for MethodSet {
    fn from_iter<I: IntoIterator<Item = Method>>(iter: I) -> Self {
        let mut set = MethodSet::default();
        for m in iter {
            set.insert(m);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_set_parse_normalizes() {
        let set = MethodSet::parse(["get", "Post", "GET"]).unwrap();
        assert_eq!(set.to_vec(), vec![Method::GET, Method::POST]);
        assert!(set.accepts(&Method::GET));
        assert!(!set.accepts(&Method::PUT));
        assert!(MethodSet::any().accepts(&Method::DELETE));
    }

    #[test]
    fn test_miss_merge_unions_methods() {
        let a = Miss::MethodNotAllowed {
            method: Method::PUT,
            allowed: vec![Method::GET],
        };
        let b = Miss::MethodNotAllowed {
            method: Method::PUT,
            allowed: vec![Method::POST, Method::GET],
        };
        assert_eq!(
            Miss::NotFound.merge(a).merge(b),
            Miss::MethodNotAllowed {
                method: Method::PUT,
                allowed: vec![Method::GET, Method::POST],
            }
        );
        assert_eq!(Miss::NotFound.merge(Miss::NotFound), Miss::NotFound);
    }
}
