//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML or JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RtmpLbConfig / HttpLbConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → sent to the running balancer, which applies what it can
//! ```
//!
//! # Design Decisions
//! - Startup config errors are fatal; reload errors keep the old config
//! - All fields have defaults to allow minimal configs
//! - Listen addresses are checked with the same parser the listeners use

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BackendConfig, HlsPlusConfig, HttpLbConfig, HttpListenConfig, LogConfig, MetricsConfig,
    RtmpLbConfig, RtmpListenConfig, UpstreamConfig,
};
pub use validation::{Validate, ValidationError};
pub use watcher::ConfigWatcher;
