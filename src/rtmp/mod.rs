//! RTMP stream proxy.
//!
//! # Data Flow
//! ```text
//! Encoder / player
//!     → net::TcpListeners (fan-in of every RTMP address)
//!     → server.rs (accept loop, one task per connection)
//!     → proxy.rs (dial 127.0.0.1:<active> with retries, copy both ways)
//!     → worker process
//! ```
//!
//! # Design Decisions
//! - Backend choice happens once per connection, at dial time
//! - No RTMP parsing: bytes are relayed verbatim
//! - A panic in one connection is logged and contained

pub mod proxy;
pub mod server;

pub use proxy::{RtmpError, RtmpProxy, Transfer};
pub use server::RtmpServer;
