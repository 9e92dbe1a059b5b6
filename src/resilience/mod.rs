//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! New client connection:
//!     → timeouts.rs (dial 127.0.0.1:<active> with a deadline)
//!     → On failure: retries.rs (sleep fixed interval, re-read active port, retry)
//!     → Budget exhausted: drop the client, no bytes sent
//! ```
//!
//! # Design Decisions
//! - Every dial has a deadline
//! - Retries re-read the active port so a switch during retry is honored
//! - Once connected, a stream is never re-dialed or migrated

pub mod retries;
pub mod timeouts;

pub use retries::RetryPolicy;
pub use timeouts::{backend_addr, connect_backend};
