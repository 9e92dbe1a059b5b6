//! HTTP (FLV/HLS+) balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Viewer request
//!     → server.rs (request ID, backend-ready check)
//!     → routing::classify (suffix dispatch)
//!     → hls_plus.rs (virtual connection → per-session client)
//!       or stream.rs (isolated client per stream, shared for .xml)
//!     → forward.rs (rewrite target, forwarded headers) → 127.0.0.1:<active>
//! ```

pub mod forward;
pub mod headers;
pub mod hls_plus;
pub mod request;
pub mod server;
pub mod stream;

pub use hls_plus::{HlsPlusProxy, SessionId, SessionTable, ViewerIds};
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
