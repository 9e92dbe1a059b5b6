//! RTMP and HTTP (FLV/HLS+) load balancers for a pool of local streaming
//! workers.
//!
//! Both balancers forward every new client to the single *active* backend on
//! `127.0.0.1`, switched at runtime through a small control API.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod rtmp;

// Traffic management
pub mod load_balancer;

// Operator surface
pub mod admin;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{HttpLbConfig, RtmpLbConfig};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use load_balancer::{BackendSelector, PortPool};
pub use net::TcpListeners;
pub use rtmp::RtmpServer;
