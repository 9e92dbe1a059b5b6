//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (path, query)
//!     → router.rs (suffix dispatch)
//!     → matcher.rs (suffix and query-parameter checks)
//!     → Return: HlsPlus, Stream, or no match
//! ```
//!
//! # Design Decisions
//! - Stateless and lock-free; evaluated per request
//! - `.ts` is ambiguous: only a uuid-tagged segment belongs to HLS+
//! - Explicit no-match rather than a catch-all backend

pub mod matcher;
pub mod router;

pub use router::{classify, Route, SHP_UUID};
