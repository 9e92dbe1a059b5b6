//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and the optional metrics exporter
//! - Bind the control API and the client-facing listeners
//! - Run until a signal (or a server task) ends the process, then shut down
//!
//! # Design Decisions
//! - Fail fast: any error before serving is fatal
//! - Every socket is bound before any task starts serving
//! - The Backend Selector starts empty; traffic is refused or dropped until
//!   the control API names an active port

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};

use crate::admin::{self, version, BackendKind, ControlState};
use crate::config::{load_config, ConfigError, ConfigWatcher, HttpLbConfig, MetricsConfig, RtmpLbConfig};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::load_balancer::BackendSelector;
use crate::net::address::{AddressError, ListenAddr};
use crate::net::ListenerError;
use crate::observability::logging::{init_logging, LoggingError};
use crate::observability::metrics::init_metrics;
use crate::rtmp::RtmpServer;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task panicked: {0}")]
    Panicked(String),
}

/// Parse, resolve and bind a single `network://host:port` address.
pub async fn bind_tcp(addr: &str) -> Result<TcpListener, StartupError> {
    let listen: ListenAddr = addr.parse()?;
    let socket_addr = listen.resolve().await?;
    TcpListener::bind(socket_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.to_string(),
            source,
        })
}

fn start_metrics(config: &MetricsConfig) {
    if !config.enabled {
        return;
    }
    match config.address.parse::<SocketAddr>() {
        Ok(addr) => init_metrics(addr),
        Err(e) => tracing::error!(
            metrics_address = %config.address,
            error = %e,
            "Failed to parse metrics address"
        ),
    }
}

/// Run the RTMP balancer described by the file at `config_path`.
pub async fn run_rtmp(config_path: &Path) -> Result<(), StartupError> {
    let config: RtmpLbConfig = load_config(config_path)?;
    init_logging(&config.log)?;
    start_metrics(&config.metrics);

    tracing::info!(
        signature = version::RTMPLB_SIGNATURE,
        config = %config_path.display(),
        api = %config.api,
        listens = ?config.rtmp.listens,
        "RTMP load balancer starting"
    );

    let selector = Arc::new(BackendSelector::new());
    let shutdown = Shutdown::new();

    let api_listener = bind_tcp(&config.api).await?;
    let server = RtmpServer::bind(&config, selector.clone()).await?;

    let (watcher, reloads) = ConfigWatcher::<RtmpLbConfig>::new(config_path);
    let _watch_guard = match watcher.run() {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload disabled");
            None
        }
    };

    let mut servers = JoinSet::new();
    let state = ControlState {
        selector,
        kind: BackendKind::Rtmp,
    };
    let api_shutdown = shutdown.subscribe();
    servers.spawn(async move {
        let result = admin::serve(api_listener, state, api_shutdown).await;
        ("control_api", result.map_err(StartupError::from))
    });
    let rtmp_shutdown = shutdown.subscribe();
    servers.spawn(async move {
        let result = server.run(rtmp_shutdown, reloads).await;
        ("rtmp", result.map_err(StartupError::from))
    });

    supervise(shutdown, servers).await
}

/// Run the HTTP (FLV/HLS+) balancer described by the file at `config_path`.
pub async fn run_http(config_path: &Path) -> Result<(), StartupError> {
    let config: HttpLbConfig = load_config(config_path)?;
    init_logging(&config.log)?;
    start_metrics(&config.metrics);

    tracing::info!(
        signature = version::HTTPLB_SIGNATURE,
        config = %config_path.display(),
        api = %config.api,
        listen = %config.http.listen,
        "HTTP load balancer starting"
    );

    let selector = Arc::new(BackendSelector::new());
    let shutdown = Shutdown::new();

    let http_listener = bind_tcp(&config.http.listen).await?;
    let api_listener = bind_tcp(&config.api).await?;
    let server = HttpServer::new(&config, selector.clone());

    let mut servers = JoinSet::new();
    let state = ControlState {
        selector,
        kind: BackendKind::Http,
    };
    let api_shutdown = shutdown.subscribe();
    servers.spawn(async move {
        let result = admin::serve(api_listener, state, api_shutdown).await;
        ("control_api", result.map_err(StartupError::from))
    });
    let http_shutdown = shutdown.subscribe();
    servers.spawn(async move {
        let result = server.run(http_listener, http_shutdown).await;
        ("http", result.map_err(StartupError::from))
    });

    supervise(shutdown, servers).await
}

type ServerExit = (&'static str, Result<(), StartupError>);

/// Wait for a signal or for any server to stop, then stop them all.
async fn supervise(shutdown: Shutdown, mut servers: JoinSet<ServerExit>) -> Result<(), StartupError> {
    let mut outcome = Ok(());

    tokio::select! {
        _ = signals::wait_for_signal() => {}
        Some(joined) = servers.join_next() => {
            record_exit(joined, &mut outcome);
            tracing::warn!("A server stopped early, shutting down the rest");
        }
    }

    shutdown.trigger();
    while let Some(joined) = servers.join_next().await {
        record_exit(joined, &mut outcome);
    }

    tracing::info!("Shutdown complete");
    outcome
}

fn record_exit(joined: Result<ServerExit, JoinError>, outcome: &mut Result<(), StartupError>) {
    match joined {
        Ok((name, Ok(()))) => tracing::info!(server = name, "Server stopped"),
        Ok((name, Err(e))) => {
            tracing::error!(server = name, error = %e, "Server failed");
            *outcome = Err(e);
        }
        Err(e) => {
            tracing::error!(error = %e, "Server task panicked");
            *outcome = Err(StartupError::Panicked(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_tcp_resolves_listen_syntax() {
        let listener = bind_tcp("tcp://127.0.0.1:0").await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn bind_tcp_rejects_bad_address() {
        assert!(matches!(
            bind_tcp("127.0.0.1:0").await,
            Err(StartupError::Address(_))
        ));
    }

    #[tokio::test]
    async fn missing_config_is_fatal() {
        let err = run_rtmp(Path::new("/nonexistent/rtmplb.toml")).await.unwrap_err();
        assert!(matches!(err, StartupError::Config(_)));
    }
}
