//! HTTP boundary subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (axum engine)
//!     → server.rs (buffer body, peer address, timeouts)
//!     → request.rs (request context)
//!     → Service::handle → middleware chain → endpoint
//!     → response.rs (Reply → formatter → wire response)
//!     → Send to client
//! ```

pub mod formatter;
pub mod request;
pub mod response;
pub mod server;

pub use formatter::{Formatter, JsonFormatter};
pub use request::{Request, RequestIdValue, X_REQUEST_ID};
pub use response::{IntoReply, Payload, Reply};
pub use server::HttpServer;
