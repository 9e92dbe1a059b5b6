//! HLS+ affinity proxy.
//!
//! # Responsibilities
//! - Reconstruct one virtual connection per viewer out of stateless requests
//! - Pin every request of a viewer to that viewer's own outbound client
//! - Evict virtual connections idle for longer than the session timeout
//!
//! # Design Decisions
//! - Sessions live in an arena keyed by [`SessionId`]; the three lookup
//!   indices only hold ids, so eviction is a plain retain over each index
//! - One lock covers lookup, insert and sweep; it is released before any
//!   network I/O
//! - Identification order is uuid, then playback-session-id, then the
//!   client's TCP address (players that send neither id)

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, Request, Uri},
    response::Response,
};
use tokio::sync::broadcast;
use tokio::time;

use crate::config::{HlsPlusConfig, UpstreamConfig};
use crate::http::forward::{build_client, forward, UpstreamClient};
use crate::observability::metrics;
use crate::routing::{matcher::query_param, SHP_UUID};

/// Query parameter carrying the playback-session-id.
pub const SHP_XPSID: &str = "shp_xpsid";
/// Header form of the playback-session-id (Safari).
pub const X_PLAYBACK_SESSION_ID: HeaderName = HeaderName::from_static("x-playback-session-id");

/// Identifiers a request carries. Empty values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewerIds {
    pub uuid: Option<String>,
    pub xpsid: Option<String>,
    pub addr: Option<String>,
}

impl ViewerIds {
    pub fn from_request(uri: &Uri, headers: &HeaderMap, peer: SocketAddr) -> Self {
        let xpsid = query_param(uri, SHP_XPSID).or_else(|| {
            headers
                .get(&X_PLAYBACK_SESSION_ID)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        });

        Self {
            uuid: query_param(uri, SHP_UUID),
            xpsid,
            addr: Some(peer.to_string()),
        }
    }
}

/// Stable handle of a virtual connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vconn-{}", self.0)
    }
}

struct Session<T> {
    transport: T,
    last_seen: Instant,
}

/// Virtual connections indexed by uuid, playback-session-id and address.
pub struct SessionTable<T> {
    next_id: u64,
    sessions: HashMap<SessionId, Session<T>>,
    by_uuid: HashMap<String, SessionId>,
    by_xpsid: HashMap<String, SessionId>,
    by_addr: HashMap<String, SessionId>,
}

impl<T: Clone> SessionTable<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            sessions: HashMap::new(),
            by_uuid: HashMap::new(),
            by_xpsid: HashMap::new(),
            by_addr: HashMap::new(),
        }
    }

    /// Existing session for `ids`, first hit in uuid, xpsid, addr order.
    pub fn find(&self, ids: &ViewerIds) -> Option<SessionId> {
        let hit = |index: &HashMap<String, SessionId>, key: &Option<String>| {
            key.as_ref().and_then(|k| index.get(k)).copied()
        };

        hit(&self.by_uuid, &ids.uuid)
            .or_else(|| hit(&self.by_xpsid, &ids.xpsid))
            .or_else(|| hit(&self.by_addr, &ids.addr))
    }

    /// Find or create the session for `ids`, touch it and index it under
    /// every key the request supplied.
    ///
    /// Returns the session, its transport and whether it was just created.
    pub fn resolve(
        &mut self,
        ids: &ViewerIds,
        now: Instant,
        create: impl FnOnce() -> T,
    ) -> (SessionId, T, bool) {
        let id = match self.find(ids).filter(|id| self.sessions.contains_key(id)) {
            Some(id) => id,
            None => {
                self.next_id += 1;
                SessionId(self.next_id)
            }
        };

        let mut created = false;
        let session = self.sessions.entry(id).or_insert_with(|| {
            created = true;
            Session {
                transport: create(),
                last_seen: now,
            }
        });
        session.last_seen = now;
        let transport = session.transport.clone();

        for (index, key) in [
            (&mut self.by_uuid, &ids.uuid),
            (&mut self.by_xpsid, &ids.xpsid),
            (&mut self.by_addr, &ids.addr),
        ] {
            if let Some(key) = key {
                index.insert(key.clone(), id);
            }
        }

        (id, transport, created)
    }

    /// Drop every session idle for longer than `timeout` from the arena and
    /// from all three indices. Returns how many were removed.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> usize {
        let expired: HashSet<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_seen) > timeout)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return 0;
        }

        self.sessions.retain(|id, _| !expired.contains(id));
        for index in [&mut self.by_uuid, &mut self.by_xpsid, &mut self.by_addr] {
            index.retain(|_, id| !expired.contains(id));
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Entries in the uuid, xpsid and addr indices.
    pub fn index_sizes(&self) -> (usize, usize, usize) {
        (self.by_uuid.len(), self.by_xpsid.len(), self.by_addr.len())
    }
}

impl<T: Clone> Default for SessionTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HlsPlusProxy {
    sessions: Mutex<SessionTable<UpstreamClient>>,
    upstream: UpstreamConfig,
    session_timeout: Duration,
    sweep_interval: Duration,
}

impl HlsPlusProxy {
    pub fn new(config: &HlsPlusConfig, upstream: UpstreamConfig) -> Self {
        Self {
            sessions: Mutex::new(SessionTable::new()),
            upstream,
            session_timeout: Duration::from_secs(config.session_timeout_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    /// Resolve the virtual connection of a request.
    pub fn session_for(&self, ids: &ViewerIds) -> (SessionId, UpstreamClient) {
        let mut table = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let (id, client, created) = table.resolve(ids, Instant::now(), || build_client(&self.upstream));

        if created {
            tracing::debug!(
                session = %id,
                uuid = ?ids.uuid,
                xpsid = ?ids.xpsid,
                addr = ?ids.addr,
                "HLS+ virtual connection created"
            );
            metrics::set_hls_plus_sessions(table.len());
        }
        (id, client)
    }

    /// Forward one HLS+ request to the backend on `port`.
    pub async fn serve(&self, port: u16, peer: SocketAddr, request: Request<Body>) -> Response {
        let ids = ViewerIds::from_request(request.uri(), request.headers(), peer);
        let (session, client) = self.session_for(&ids);

        tracing::debug!(
            session = %session,
            backend_port = port,
            path = %request.uri().path(),
            "Proxying HLS+ request"
        );
        forward(&client, port, peer, request).await
    }

    /// Evict sessions idle at `now`.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut table = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = table.sweep(now, self.session_timeout);
        if removed > 0 {
            let (uuid, xpsid, addr) = table.index_sizes();
            tracing::info!(
                removed,
                sessions = table.len(),
                by_uuid = uuid,
                by_xpsid = xpsid,
                by_addr = addr,
                "HLS+ idle sessions evicted"
            );
            metrics::set_hls_plus_sessions(table.len());
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn find(&self, ids: &ViewerIds) -> Option<SessionId> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).find(ids)
    }

    /// Periodic idle sweep until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.sweep_interval.as_secs(),
            timeout_secs = self.session_timeout.as_secs(),
            "HLS+ session sweeper started"
        );

        let mut ticker = time::interval(self.sweep_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_at(Instant::now());
                }
                _ = shutdown.recv() => {
                    tracing::info!("HLS+ session sweeper received shutdown signal");
                    break;
                }
            }
        }
    }
}
