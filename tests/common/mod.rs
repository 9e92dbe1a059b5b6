//! Shared mock backends and balancer harnesses for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, Uri},
    Router,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use streamlb::config::{HttpLbConfig, RtmpLbConfig};
use streamlb::http::HlsPlusProxy;
use streamlb::load_balancer::BackendSelector;
use streamlb::{HttpServer, RtmpServer, Shutdown};

/// Start a TCP backend that writes `tag` on accept, then echoes.
pub async fn start_tagged_echo(tag: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if !tag.is_empty() && socket.write_all(tag).await.is_err() {
                    return;
                }
                let (mut r, mut w) = socket.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    port
}

/// Start a plain TCP echo backend.
pub async fn start_echo_backend() -> u16 {
    start_tagged_echo(b"").await
}

/// A request as seen by a mock HTTP backend.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path_and_query: String,
    pub peer: SocketAddr,
    pub real_ip: Option<String>,
    pub forwarded_for: Option<String>,
}

pub type Seen = Arc<Mutex<Vec<SeenRequest>>>;

#[derive(Clone)]
struct BackendState {
    tag: &'static str,
    seen: Seen,
}

async fn record(
    State(state): State<BackendState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.seen.lock().unwrap().push(SeenRequest {
        path_and_query: uri.path_and_query().map(|p| p.to_string()).unwrap_or_default(),
        peer,
        real_ip: header("x-real-ip"),
        forwarded_for: header("x-forwarded-for"),
    });
    format!("{} {}", state.tag, uri.path())
}

/// Start an HTTP backend answering `"<tag> <path>"` and recording requests.
pub async fn start_http_backend(tag: &'static str) -> (u16, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let seen: Seen = Arc::default();

    let app = Router::new().fallback(record).with_state(BackendState {
        tag,
        seen: seen.clone(),
    });
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    (port, seen)
}

pub fn rtmp_config() -> RtmpLbConfig {
    let mut config = RtmpLbConfig::default();
    config.rtmp.listens = vec!["tcp://127.0.0.1:0".to_string()];
    config.backend.retry_max = 2;
    config.backend.retry_interval_ms = 50;
    config.backend.connect_timeout_ms = 200;
    config
}

pub struct RtmpHarness {
    pub addr: SocketAddr,
    pub selector: Arc<BackendSelector>,
    pub shutdown: Shutdown,
    pub reloads: mpsc::UnboundedSender<RtmpLbConfig>,
}

pub async fn start_rtmp(config: RtmpLbConfig) -> RtmpHarness {
    let selector = Arc::new(BackendSelector::new());
    let server = RtmpServer::bind(&config, selector.clone()).await.unwrap();
    let addr = server.local_addrs().await[0];

    let shutdown = Shutdown::new();
    let (reloads, reload_rx) = mpsc::unbounded_channel();
    tokio::spawn(server.run(shutdown.subscribe(), reload_rx));

    RtmpHarness {
        addr,
        selector,
        shutdown,
        reloads,
    }
}

pub struct HttpHarness {
    pub addr: SocketAddr,
    pub selector: Arc<BackendSelector>,
    pub hls_plus: Arc<HlsPlusProxy>,
    pub shutdown: broadcast::Sender<()>,
}

pub async fn start_http(config: HttpLbConfig) -> HttpHarness {
    let selector = Arc::new(BackendSelector::new());
    let server = HttpServer::new(&config, selector.clone());
    let hls_plus = server.hls_plus();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(server.run(listener, shutdown_rx));

    HttpHarness {
        addr,
        selector,
        hls_plus,
        shutdown,
    }
}

/// A client that never goes through an environment proxy and never pools,
/// so every call is a new TCP connection with a new source port.
pub fn fresh_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
