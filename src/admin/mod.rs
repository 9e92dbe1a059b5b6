//! Control API.
//!
//! # Endpoints
//! - `GET /api/v1/version`
//! - `GET /api/v1/proxy?rtmp=<port>` (RTMP balancer) or `?http=<port>` (HTTP balancer)
//! - `GET /api/v1/backends`
//!
//! Served on its own listener so switching backends never competes with
//! viewer traffic.

pub mod error;
pub mod handlers;
pub mod version;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{set_header::SetResponseHeaderLayer, timeout::TimeoutLayer, trace::TraceLayer};

use self::handlers::*;

pub use self::error::ApiError;
pub use self::handlers::{BackendKind, ControlState};

#[allow(deprecated)]
pub fn control_router(state: ControlState) -> Router {
    let signature = state.kind.signature();

    Router::new()
        .route("/api/v1/version", get(get_version))
        .route("/api/v1/proxy", get(set_proxy))
        .route("/api/v1/backends", get(get_backends))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::SERVER,
            HeaderValue::from_static(signature),
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(TraceLayer::new_for_http())
}

/// Serve the control API until shutdown.
pub async fn serve(
    listener: TcpListener,
    state: ControlState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    for path in ["/api/v1/version", "/api/v1/proxy", "/api/v1/backends"] {
        tracing::info!(url = %format!("http://{addr}{path}"), "Control API route");
    }

    let app = control_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Control API stopped");
    Ok(())
}
