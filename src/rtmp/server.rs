//! RTMP accept loop.
//!
//! # Responsibilities
//! - Own the client-facing listeners
//! - Hand every accepted connection to the relay on its own task
//! - Apply reloaded configuration (retry policy, listen addresses)
//! - Dispose the listeners on shutdown
//!
//! # Design Decisions
//! - Accept errors are logged and the loop continues
//! - On shutdown, relays in flight are left to finish on their own; the
//!   live count is logged so an operator can see what is still draining

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::config::RtmpLbConfig;
use crate::load_balancer::BackendSelector;
use crate::net::{ListenerError, TcpListeners};
use crate::observability::metrics;
use crate::resilience::RetryPolicy;
use crate::rtmp::proxy::RtmpProxy;

pub struct RtmpServer {
    proxy: Arc<RtmpProxy>,
    listeners: Arc<TcpListeners>,
    listens: Vec<String>,
}

impl RtmpServer {
    /// Bind every configured address. Nothing is accepted until [`run`].
    ///
    /// [`run`]: RtmpServer::run
    pub async fn bind(
        config: &RtmpLbConfig,
        selector: Arc<BackendSelector>,
    ) -> Result<Self, ListenerError> {
        let listeners = bind_listeners(&config.rtmp.listens).await?;
        let proxy = Arc::new(RtmpProxy::new(selector, RetryPolicy::from(&config.backend)));

        Ok(Self {
            proxy,
            listeners,
            listens: config.rtmp.listens.clone(),
        })
    }

    pub async fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.local_addrs().await
    }

    pub fn proxy(&self) -> Arc<RtmpProxy> {
        Arc::clone(&self.proxy)
    }

    /// Accept until shutdown.
    ///
    /// Fails only if a reload left the server with no bound socket at all.
    pub async fn run(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
        mut reloads: mpsc::UnboundedReceiver<RtmpLbConfig>,
    ) -> Result<(), ListenerError> {
        tracing::info!(listens = ?self.listens, "RTMP server accepting");

        let outcome = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("RTMP server received shutdown signal");
                    break Ok(());
                }
                Some(config) = reloads.recv() => {
                    if let Err(e) = self.reload(config).await {
                        tracing::error!(error = %e, "RTMP server has no listener left");
                        break Err(e);
                    }
                }
                accepted = self.listeners.accept() => match accepted {
                    Ok((stream, peer)) => {
                        metrics::record_connection_accepted();
                        tracing::debug!(peer_addr = %peer, "RTMP client accepted");
                        self.proxy.spawn(stream, peer);
                    }
                    Err(e) if e.is_disposed() => {
                        tracing::info!("RTMP listeners disposed");
                        break Ok(());
                    }
                    Err(e) => tracing::warn!(error = %e, "RTMP accept failed"),
                },
            }
        };

        if let Err(e) = self.listeners.close().await {
            tracing::debug!(error = %e, "RTMP listeners already closed");
        }

        tracing::info!(
            live_connections = self.proxy.tracker().live(),
            total_connections = self.proxy.tracker().total(),
            "RTMP server stopped"
        );
        outcome
    }

    async fn reload(&mut self, config: RtmpLbConfig) -> Result<(), ListenerError> {
        let policy = RetryPolicy::from(&config.backend);
        if policy != self.proxy.policy() {
            tracing::info!(
                max_attempts = policy.max_attempts,
                interval_ms = policy.interval.as_millis() as u64,
                connect_timeout_ms = policy.connect_timeout.as_millis() as u64,
                "Backend retry policy updated"
            );
            self.proxy.set_policy(policy);
        }

        if config.rtmp.listens == self.listens {
            return Ok(());
        }

        // New addresses may overlap the old ones, so the old sockets go first.
        if let Err(e) = self.listeners.close().await {
            tracing::debug!(error = %e, "RTMP listeners already closed");
        }

        match bind_listeners(&config.rtmp.listens).await {
            Ok(listeners) => {
                tracing::info!(from = ?self.listens, to = ?config.rtmp.listens, "RTMP listeners rebound");
                self.listeners = listeners;
                self.listens = config.rtmp.listens;
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    listens = ?config.rtmp.listens,
                    error = %e,
                    "Failed to bind new RTMP listeners, restoring previous ones"
                );
                self.listeners = bind_listeners(&self.listens).await?;
                Ok(())
            }
        }
    }
}

async fn bind_listeners(listens: &[String]) -> Result<Arc<TcpListeners>, ListenerError> {
    let listeners = TcpListeners::new(listens)?;
    listeners.listen().await?;
    Ok(Arc::new(listeners))
}
