//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Logging/metrics → Bind API + listeners → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal or server exit → Broadcast → Dispose listeners → Join servers
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then sockets, then tasks
//! - Established RTMP relays and streaming HTTP responses are not cut at
//!   shutdown; they end when either peer closes

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run_http, run_rtmp, StartupError};
