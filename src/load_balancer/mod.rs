//! Backend selection subsystem.
//!
//! # Data Flow
//! ```text
//! Control API: /api/v1/proxy?rtmp=19350
//!     → selector.rs (record port, swap active port)
//!
//! New client connection / request
//!     → selector.rs (read active port once)
//!     → dial 127.0.0.1:<active>
//!
//! Worker group spawn (supervisor)
//!     → ports.rs (contiguous block alloc / per-port free)
//! ```
//!
//! # Design Decisions
//! - Exactly one active backend; switching is external, not load-aware
//! - A switch only affects connections that have not dialed yet
//! - The selector is an injected component, never global state

pub mod ports;
pub mod selector;

pub use ports::{PortError, PortPool};
pub use selector::{BackendSelector, SelectorError};
