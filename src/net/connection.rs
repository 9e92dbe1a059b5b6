//! Live connection tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for log correlation
//! - Count live proxied connections with RAII guards
//! - Report what is still draining when the balancer shuts down

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::observability::metrics;

/// Relaxed ordering is enough: IDs only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a proxied connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts live connections of one balancer.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    live: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. The returned guard un-records it on drop.
    pub fn track(&self, peer: SocketAddr) -> ConnectionGuard {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.total.fetch_add(1, Ordering::Relaxed);
        metrics::set_live_connections(live);

        ConnectionGuard {
            live: Arc::clone(&self.live),
            id: ConnectionId::next(),
            peer,
            opened_at: Instant::now(),
        }
    }

    /// Connections currently open.
    pub fn live(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }

    /// Connections seen since start.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Holds one slot in a [`ConnectionTracker`] for the connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    live: Arc<AtomicU64>,
    id: ConnectionId,
    peer: SocketAddr,
    opened_at: Instant,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let live = self.live.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_live_connections(live);
        tracing::trace!(
            connection_id = %self.id,
            peer_addr = %self.peer,
            duration_ms = self.age().as_millis() as u64,
            "Connection closed"
        );
    }
}
