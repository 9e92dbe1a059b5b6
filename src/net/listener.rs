//! Multi-address TCP listener.
//!
//! # Responsibilities
//! - Bind one socket per configured `network://host:port` address
//! - Fan accepted connections and accept errors from every socket into one
//!   accept stream
//! - One-shot disposal: unblock every accept loop and the consumer, join the
//!   accept loops, then refuse any further use
//!
//! # Lifecycle
//! ```text
//! NotStarted --listen()--> Listening --close()--> Disposed
//!      \________________________close()_________/
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;

use crate::net::address::{AddressError, ListenAddr};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) cannot spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// No address was configured.
    #[error("no listen addresses")]
    Empty,

    /// An address is malformed.
    #[error("invalid listen address: {0}")]
    Config(#[from] AddressError),

    /// Failed to bind to address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Failed to accept connection.
    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),

    /// `listen` was called twice.
    #[error("listener already started")]
    AlreadyListening,

    /// The listener was closed by its owner.
    #[error("listener disposed")]
    Disposed,
}

impl ListenerError {
    /// True for the expected end-of-life signal, which must not be logged as a failure.
    pub fn is_disposed(&self) -> bool {
        matches!(self, ListenerError::Disposed)
    }
}

/// Lifecycle state of a [`TcpListeners`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    NotStarted,
    Listening,
    Disposed,
}

/// An accepted connection and its peer address.
pub type Accepted = (TcpStream, SocketAddr);

struct Inbox {
    conns: mpsc::Receiver<Accepted>,
    errors: mpsc::Receiver<io::Error>,
}

struct Control {
    state: ListenerState,
    tasks: JoinSet<()>,
    local_addrs: Vec<SocketAddr>,
}

/// Several bound TCP sockets observed as one accept stream.
pub struct TcpListeners {
    addrs: Vec<ListenAddr>,
    conns_tx: mpsc::Sender<Accepted>,
    errors_tx: mpsc::Sender<io::Error>,
    /// Single-consumer side; concurrent `accept` calls queue here.
    inbox: Mutex<Inbox>,
    control: Mutex<Control>,
    closing: watch::Sender<bool>,
    disposed: AtomicBool,
}

impl TcpListeners {
    /// Validate every address without opening any socket.
    pub fn new<I, S>(addrs: I) -> Result<Self, ListenerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addrs = addrs
            .into_iter()
            .map(|a| a.as_ref().parse::<ListenAddr>())
            .collect::<Result<Vec<_>, _>>()?;
        if addrs.is_empty() {
            return Err(ListenerError::Empty);
        }

        let (conns_tx, conns) = mpsc::channel(1);
        let (errors_tx, errors) = mpsc::channel(1);
        let (closing, _) = watch::channel(false);

        Ok(Self {
            addrs,
            conns_tx,
            errors_tx,
            inbox: Mutex::new(Inbox { conns, errors }),
            control: Mutex::new(Control {
                state: ListenerState::NotStarted,
                tasks: JoinSet::new(),
                local_addrs: Vec::new(),
            }),
            closing,
            disposed: AtomicBool::new(false),
        })
    }

    /// The configured addresses.
    pub fn addrs(&self) -> &[ListenAddr] {
        &self.addrs
    }

    /// Bind every address and start one accept loop per socket.
    ///
    /// Sockets are only handed to accept loops once all of them are bound;
    /// if any bind fails the sockets bound so far are dropped before the
    /// error is returned and the listener stays `NotStarted`.
    pub async fn listen(&self) -> Result<Vec<SocketAddr>, ListenerError> {
        let mut control = self.control.lock().await;
        match control.state {
            ListenerState::Disposed => return Err(ListenerError::Disposed),
            ListenerState::Listening => return Err(ListenerError::AlreadyListening),
            ListenerState::NotStarted => {}
        }

        let mut bound = Vec::with_capacity(self.addrs.len());
        for addr in &self.addrs {
            let socket_addr = addr.resolve().await?;
            let bind_error = |source| ListenerError::Bind {
                addr: addr.to_string(),
                source,
            };
            let listener = TcpListener::bind(socket_addr).await.map_err(bind_error)?;
            let local = listener.local_addr().map_err(bind_error)?;

            tracing::info!(address = %addr, local_addr = %local, "Listener bound");
            bound.push((addr.clone(), listener, local));
        }

        for (addr, listener, local) in bound {
            control.local_addrs.push(local);
            control.tasks.spawn(accept_from(
                listener,
                addr,
                self.conns_tx.clone(),
                self.errors_tx.clone(),
                self.closing.subscribe(),
            ));
        }
        control.state = ListenerState::Listening;

        Ok(control.local_addrs.clone())
    }

    /// Wait for the next connection from any socket.
    ///
    /// Returns an accept error forwarded from one of the sockets, or
    /// [`ListenerError::Disposed`] once the listener is closed.
    pub async fn accept(&self) -> Result<Accepted, ListenerError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ListenerError::Disposed);
        }

        let mut closing = self.closing.subscribe();
        let mut inbox = tokio::select! {
            biased;
            _ = closing.wait_for(|closed| *closed) => return Err(ListenerError::Disposed),
            inbox = self.inbox.lock() => inbox,
        };
        let Inbox { conns, errors } = &mut *inbox;

        tokio::select! {
            biased;
            _ = closing.wait_for(|closed| *closed) => Err(ListenerError::Disposed),
            conn = conns.recv() => conn.ok_or(ListenerError::Disposed),
            err = errors.recv() => match err {
                Some(e) => Err(ListenerError::Accept(e)),
                None => Err(ListenerError::Disposed),
            },
        }
    }

    /// Dispose the listener.
    ///
    /// The first call stops every accept loop, waits for all of them to exit
    /// (which drops their sockets) and marks the object disposed. Later calls
    /// return [`ListenerError::Disposed`].
    pub async fn close(&self) -> Result<(), ListenerError> {
        self.closing.send_replace(true);

        let mut control = self.control.lock().await;
        if control.state == ListenerState::Disposed {
            return Err(ListenerError::Disposed);
        }
        control.state = ListenerState::Disposed;
        self.disposed.store(true, Ordering::Release);

        while let Some(joined) = control.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Accept loop terminated abnormally");
            }
        }

        tracing::info!(
            addresses = ?self.addrs.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Listeners disposed"
        );
        Ok(())
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ListenerState {
        self.control.lock().await.state
    }

    /// Local addresses of the bound sockets, in configuration order.
    pub async fn local_addrs(&self) -> Vec<SocketAddr> {
        self.control.lock().await.local_addrs.clone()
    }
}

async fn accept_from(
    listener: TcpListener,
    addr: ListenAddr,
    conns: mpsc::Sender<Accepted>,
    errors: mpsc::Sender<io::Error>,
    mut closing: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = closing.wait_for(|closed| *closed) => break,
            res = listener.accept() => res,
        };

        match accepted {
            Ok((stream, peer)) => {
                tokio::select! {
                    biased;
                    _ = closing.wait_for(|closed| *closed) => {
                        // Never handed to the consumer, so close it here.
                        tracing::warn!(listener = %addr, peer_addr = %peer, "Dropping connection accepted during disposal");
                        break;
                    }
                    sent = conns.send((stream, peer)) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                if *closing.borrow() {
                    break;
                }
                tracing::debug!(listener = %addr, error = %e, "Accept failed");

                tokio::select! {
                    biased;
                    _ = closing.wait_for(|closed| *closed) => break,
                    sent = errors.send(e) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
                tokio::select! {
                    _ = closing.wait_for(|closed| *closed) => break,
                    _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                }
            }
        }
    }

    tracing::debug!(listener = %addr, "Accept loop exited");
}
