//! Active backend selection.
//!
//! # Responsibilities
//! - Remember every backend port the control plane ever announced
//! - Hold the single active port read by every proxy task
//!
//! # Design Decisions
//! - One writer (the control API), many readers (one per connection)
//! - The active port is an atomic word: readers never take a lock
//! - The port list only grows; switching back to an old port is cheap

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;

use thiserror::Error;

use crate::observability::metrics;

/// Port value meaning "no backend ready".
const NO_BACKEND: u16 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("backend port must be positive")]
    InvalidPort,
}

/// The mutable cell shared by the control API and both proxies.
#[derive(Debug, Default)]
pub struct BackendSelector {
    active: AtomicU16,
    known: Mutex<Vec<u16>>,
}

impl BackendSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `port` the backend for every connection dialed from now on.
    ///
    /// Returns the previously active port. Reachability is not checked:
    /// a dead port surfaces as dial failures in the proxies.
    pub fn set_active(&self, port: u16) -> Result<Option<u16>, SelectorError> {
        if port == NO_BACKEND {
            return Err(SelectorError::InvalidPort);
        }

        // The list is updated before the store so the active port is always known.
        let mut known = self.known.lock().unwrap_or_else(|e| e.into_inner());
        if !known.contains(&port) {
            known.push(port);
        }
        let previous = self.active.swap(port, Ordering::AcqRel);

        tracing::info!(
            port,
            previous,
            ports = ?known.as_slice(),
            "Active backend changed"
        );
        metrics::record_backend_switch(port);

        Ok((previous != NO_BACKEND).then_some(previous))
    }

    /// The active port, if any backend is ready.
    pub fn active(&self) -> Option<u16> {
        match self.active.load(Ordering::Acquire) {
            NO_BACKEND => None,
            port => Some(port),
        }
    }

    /// Every port ever made active, in announcement order.
    pub fn known_ports(&self) -> Vec<u16> {
        self.known.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
