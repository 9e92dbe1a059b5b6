//! Per-connection RTMP relay.
//!
//! # Responsibilities
//! - Dial the active backend on 127.0.0.1, retrying a bounded number of times
//! - Copy bytes both ways until either side finishes
//! - Contain a panicking connection so the balancer keeps serving
//!
//! The relay is protocol-agnostic: RTMP bytes are never parsed.

use std::any::Any;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::load_balancer::BackendSelector;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::observability::metrics;
use crate::resilience::{connect_backend, RetryPolicy};

const COPY_BUFFER_SIZE: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum RtmpError {
    #[error("no backend reachable after {attempts} attempts")]
    BackendUnavailable { attempts: u32 },

    #[error("relay I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of one relayed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub backend_port: u16,
    /// Bytes read from the client and written to the backend.
    pub to_backend: u64,
    /// Bytes read from the backend and written to the client.
    pub to_client: u64,
}

pub struct RtmpProxy {
    selector: Arc<BackendSelector>,
    policy: ArcSwap<RetryPolicy>,
    tracker: ConnectionTracker,
}

impl RtmpProxy {
    pub fn new(selector: Arc<BackendSelector>, policy: RetryPolicy) -> Self {
        Self {
            selector,
            policy: ArcSwap::from_pointee(policy),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Replace the dial policy. Connections already dialing keep the old one.
    pub fn set_policy(&self, policy: RetryPolicy) {
        self.policy.store(Arc::new(policy));
    }

    pub fn policy(&self) -> RetryPolicy {
        **self.policy.load()
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Dial the active backend.
    ///
    /// The active port is read again on every attempt. An attempt with no
    /// active backend fails without dialing and still uses up budget.
    pub async fn dial(&self) -> Result<(TcpStream, u16), RtmpError> {
        let policy = self.policy();
        let attempts = policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(policy.interval).await;
            }

            let Some(port) = self.selector.active() else {
                tracing::warn!(attempt, max_attempts = attempts, "No active backend");
                continue;
            };

            match connect_backend(port, policy.connect_timeout).await {
                Ok(stream) => {
                    tracing::debug!(backend_port = port, attempt, "Backend connected");
                    return Ok((stream, port));
                }
                Err(e) => {
                    metrics::record_dial_failure();
                    tracing::warn!(
                        backend_port = port,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Backend dial failed"
                    );
                }
            }
        }

        Err(RtmpError::BackendUnavailable { attempts })
    }

    /// Relay one client connection to the active backend.
    pub async fn serve(&self, mut client: TcpStream, peer: SocketAddr) -> Result<Transfer, RtmpError> {
        let (mut backend, backend_port) = self.dial().await?;
        tracing::info!(peer_addr = %peer, backend_port, "Relaying RTMP connection");

        let mut to_backend = 0u64;
        let mut to_client = 0u64;
        {
            let (mut client_rd, mut client_wr) = client.split();
            let (mut backend_rd, mut backend_wr) = backend.split();

            // The first direction to finish ends the relay; dropping the
            // other future abandons its copy.
            let (side, result) = tokio::select! {
                r = pump(&mut client_rd, &mut backend_wr, &mut to_backend) => ("client", r),
                r = pump(&mut backend_rd, &mut client_wr, &mut to_client) => ("backend", r),
            };
            match result {
                Ok(()) => tracing::debug!(peer_addr = %peer, side, "Peer closed"),
                Err(e) => tracing::debug!(peer_addr = %peer, side, error = %e, "Relay copy failed"),
            }
        }

        metrics::record_proxied_bytes(to_backend, to_client);
        Ok(Transfer {
            backend_port,
            to_backend,
            to_client,
        })
    }

    /// Track, relay and log one connection. Never panics outward.
    pub async fn handle(&self, client: TcpStream, peer: SocketAddr) {
        let guard = self.tracker.track(peer);
        contain(guard, self.serve(client, peer)).await;
    }

    /// Run [`RtmpProxy::handle`] on its own task.
    pub fn spawn(self: &Arc<Self>, client: TcpStream, peer: SocketAddr) -> JoinHandle<()> {
        let proxy = Arc::clone(self);
        tokio::spawn(async move { proxy.handle(client, peer).await })
    }
}

/// Drive one relay to completion, catching a panic inside it. The guard is
/// released whichever way the relay ends.
async fn contain<F>(guard: ConnectionGuard, relay: F)
where
    F: Future<Output = Result<Transfer, RtmpError>>,
{
    let id = guard.id();
    let peer = guard.peer();

    match AssertUnwindSafe(relay).catch_unwind().await {
        Ok(Ok(transfer)) => tracing::info!(
            connection_id = %id,
            peer_addr = %peer,
            backend_port = transfer.backend_port,
            read_bytes = transfer.to_backend,
            write_bytes = transfer.to_client,
            duration_ms = guard.age().as_millis() as u64,
            "RTMP connection closed"
        ),
        Ok(Err(e)) => tracing::warn!(
            connection_id = %id,
            peer_addr = %peer,
            error = %e,
            "RTMP connection dropped"
        ),
        Err(panic) => tracing::error!(
            connection_id = %id,
            peer_addr = %peer,
            panic = %panic_message(panic.as_ref()),
            "RTMP connection handler panicked"
        ),
    }
}

async fn pump<R, W>(reader: &mut R, writer: &mut W, copied: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            let _ = writer.shutdown().await;
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        *copied += n as u64;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio::net::TcpListener;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            interval: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn dial_without_backend_exhausts_budget() {
        let proxy = RtmpProxy::new(Arc::new(BackendSelector::new()), fast_policy(3));

        let start = Instant::now();
        let err = proxy.dial().await.unwrap_err();

        assert!(matches!(err, RtmpError::BackendUnavailable { attempts: 3 }));
        // Two sleeps between three attempts.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn dial_picks_up_a_switch_during_retries() {
        let selector = Arc::new(BackendSelector::new());
        let proxy = RtmpProxy::new(selector.clone(), fast_policy(10));

        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = backend.local_addr().unwrap().port();

        let switcher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            selector.set_active(port).unwrap();
        });

        let (_stream, dialed) = proxy.dial().await.unwrap();
        assert_eq!(dialed, port);
        switcher.await.unwrap();
    }

    #[tokio::test]
    async fn policy_swap_applies_to_next_dial() {
        let proxy = RtmpProxy::new(Arc::new(BackendSelector::new()), fast_policy(3));
        proxy.set_policy(fast_policy(1));

        let err = proxy.dial().await.unwrap_err();
        assert!(matches!(err, RtmpError::BackendUnavailable { attempts: 1 }));
    }

    #[tokio::test]
    async fn pump_counts_and_half_closes() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let (mut c, mut d) = tokio::io::duplex(64);

        a.write_all(b"hello").await.unwrap();
        drop(a);

        let mut copied = 0;
        pump(&mut b, &mut c, &mut copied).await.unwrap();
        assert_eq!(copied, 5);

        let mut out = Vec::new();
        d.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn panicking_relay_is_contained() {
        let selector = Arc::new(BackendSelector::new());
        let proxy = Arc::new(RtmpProxy::new(selector.clone(), fast_policy(1)));
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();

        let guard = proxy.tracker().track(peer);
        assert_eq!(proxy.tracker().live(), 1);
        let relay = async { panic!("relay exploded") };
        tokio::spawn(contain(guard, relay)).await.unwrap();
        assert_eq!(proxy.tracker().live(), 0);

        // The same proxy keeps relaying afterwards.
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        selector.set_active(backend.local_addr().unwrap().port()).unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = backend.accept().await.unwrap();
            let (mut r, mut w) = socket.split();
            let _ = tokio::io::copy(&mut r, &mut w).await;
        });

        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(front.local_addr().unwrap()).await.unwrap();
        let (server_side, client_peer) = front.accept().await.unwrap();
        let relayed = proxy.spawn(server_side, client_peer);

        client.write_all(b"still up").await.unwrap();
        let mut echoed = [0u8; 8];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"still up");

        drop(client);
        relayed.await.unwrap();
        assert_eq!(proxy.tracker().live(), 0);
        assert_eq!(proxy.tracker().total(), 2);
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
