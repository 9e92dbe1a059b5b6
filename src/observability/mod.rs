//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, stdout or file)
//!     → metrics.rs (counters and gauges, Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (port, peer_addr, connection_id) instead of formatted strings
//! - Expected shutdown noise (disposed listeners) is never logged as an error
//! - The exporter is optional; recording without it costs nothing

pub mod logging;
pub mod metrics;
