//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events and spans (structured fields)
//!     → logging.rs (subscriber: filter + fmt layer)
//!
//! Service boundary, once per request:
//!     → access.rs (AccessRecord rendered by an AccessTemplate)
//!     → tracing event on target `switchyard::access`
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Request ID flows through the chain as a span field
//! - Sinks are the subscriber's concern, never the core's

pub mod access;
pub mod logging;

pub use access::{AccessRecord, AccessTemplate};
