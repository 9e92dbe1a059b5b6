//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! "tcp4://:1935", "tcp6://:1935"
//!     → address.rs (parse network://host:port, fail fast)
//!     → listener.rs (one socket + accept loop per address, fan-in)
//!     → accept() → one stream of (TcpStream, peer)
//!     → connection.rs (live connection accounting)
//! ```
//!
//! # Design Decisions
//! - Addresses are validated before any socket is opened
//! - Disposal is one-shot and joins every accept loop before returning
//! - `Disposed` is an expected outcome, never logged as an error

pub mod address;
pub mod connection;
pub mod listener;

pub use address::{ListenAddr, Network};
pub use listener::{ListenerError, ListenerState, TcpListeners};
