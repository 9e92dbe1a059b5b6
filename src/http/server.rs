//! HTTP balancer server.
//!
//! # Responsibilities
//! - Create the Axum router with the balancing handler as its only route
//! - Wire up middleware (request ID, tracing, Server signature)
//! - Refuse traffic until a backend is active
//! - Dispatch by URL suffix to HLS+ or plain stream forwarding
//! - Run the HLS+ idle sweeper alongside the server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::admin::version::HTTPLB_SIGNATURE;
use crate::config::HttpLbConfig;
use crate::http::hls_plus::HlsPlusProxy;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::stream::StreamProxy;
use crate::load_balancer::BackendSelector;
use crate::observability::metrics;
use crate::routing::{classify, Route};

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub selector: Arc<BackendSelector>,
    pub hls_plus: Arc<HlsPlusProxy>,
    pub stream: Arc<StreamProxy>,
}

/// HTTP (FLV/HLS+) balancer.
pub struct HttpServer {
    router: Router,
    hls_plus: Arc<HlsPlusProxy>,
}

impl HttpServer {
    pub fn new(config: &HttpLbConfig, selector: Arc<BackendSelector>) -> Self {
        let hls_plus = Arc::new(HlsPlusProxy::new(&config.hls_plus, config.upstream.clone()));
        let state = AppState {
            selector,
            hls_plus: hls_plus.clone(),
            stream: Arc::new(StreamProxy::new(config.upstream.clone())),
        };

        Self {
            router: build_router(state),
            hls_plus,
        }
    }

    /// The router, for serving or for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn hls_plus(&self) -> Arc<HlsPlusProxy> {
        self.hls_plus.clone()
    }

    /// Serve on `listener` until shutdown.
    ///
    /// Requests still streaming at shutdown are waited for.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP balancer starting");

        let sweeper = tokio::spawn(self.hls_plus.clone().run_sweeper(shutdown.resubscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP balancer received shutdown signal");
            })
            .await?;

        if let Err(e) = sweeper.await {
            tracing::error!(error = %e, "HLS+ sweeper terminated abnormally");
        }
        tracing::info!("HTTP balancer stopped");
        Ok(())
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(balance_handler)
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::SERVER,
            HeaderValue::from_static(HTTPLB_SIGNATURE),
        ))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

/// Pick the active backend and forward by route.
async fn balance_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let request_id = request_id(request.headers()).to_string();

    let Some(port) = state.selector.active() else {
        tracing::warn!(request_id = %request_id, path = %request.uri().path(), "Backend not ready");
        metrics::record_http_request("none", 503, start);
        return (StatusCode::SERVICE_UNAVAILABLE, "Backend not ready").into_response();
    };

    let Some(route) = classify(request.uri()) else {
        tracing::debug!(request_id = %request_id, path = %request.uri().path(), "No route matched");
        metrics::record_http_request("none", 404, start);
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };

    let response = match route {
        Route::HlsPlus => state.hls_plus.serve(port, peer, request).await,
        Route::Stream { shared_transport } => {
            state.stream.serve(port, peer, shared_transport, request).await
        }
    };

    tracing::debug!(
        request_id = %request_id,
        route = route.name(),
        backend_port = port,
        status = response.status().as_u16(),
        "Request forwarded"
    );
    metrics::record_http_request(route.name(), response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::connect_info::MockConnectInfo;
    use tower::ServiceExt;

    fn app(selector: Arc<BackendSelector>) -> Router {
        HttpServer::new(&HttpLbConfig::default(), selector)
            .router()
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn not_ready_without_active_backend() {
        let response = app(Arc::new(BackendSelector::new()))
            .oneshot(get("/live/a.m3u8"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::SERVER], HTTPLB_SIGNATURE);
        assert!(response.headers().contains_key("x-request-id"));

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Backend not ready");
    }

    #[tokio::test]
    async fn unknown_suffix_is_not_served() {
        let selector = Arc::new(BackendSelector::new());
        selector.set_active(1).unwrap();

        let response = app(selector).oneshot(get("/index.html")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn client_request_id_is_echoed() {
        let request = Request::get("/x.flv")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();

        let response = app(Arc::new(BackendSelector::new()))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }
}
