//! Container: process-wide factory and event backstop
//!
//! A container owns an identity (container id), creates client and
//! server connections, and carries the last-resort listener set at the
//! tail of every dispatch chain. It outlives the connections it creates
//! but does not own their sockets.

use crate::config::{ConnectOptions, ListenOptions};
use crate::connection::{Connection, WireSink};
use crate::dispatch::ListenerSet;
use crate::error::{Result, TetherError};
use crate::events::{Event, EventType};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tether_engine::ProtocolEngine;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Injectable source of connection ids, so tests can predict them
/// instead of depending on process-wide shared state.
#[derive(Debug)]
pub struct IdSequence {
    counter: AtomicU64,
}

impl IdSequence {
    /// A sequence starting at `start`.
    pub fn starting_at(start: u64) -> Self {
        IdSequence {
            counter: AtomicU64::new(start),
        }
    }

    /// Next id in the sequence.
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// Options for building a container.
#[derive(Debug, Default)]
pub struct ContainerOptions {
    /// Explicit container id. Generated (uuid v4) when absent.
    pub id: Option<String>,
    /// Connection id source. Defaults to a fresh sequence starting at 1.
    pub id_sequence: Option<IdSequence>,
}

pub(crate) struct ContainerInner {
    engine: Arc<dyn ProtocolEngine>,
    container_id: String,
    listeners: ListenerSet,
    ids: IdSequence,
}

impl ContainerInner {
    pub(crate) fn engine(&self) -> Arc<dyn ProtocolEngine> {
        self.engine.clone()
    }

    pub(crate) fn container_id(&self) -> &str {
        &self.container_id
    }

    pub(crate) fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    pub(crate) fn ids(&self) -> &IdSequence {
        &self.ids
    }
}

/// Application-scoped factory for connections, and the unconditional
/// tail of every event dispatch chain.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// A container with a generated id over the given engine.
    pub fn new(engine: Arc<dyn ProtocolEngine>) -> Self {
        Self::with_options(engine, ContainerOptions::default())
    }

    /// A container with explicit options.
    pub fn with_options(engine: Arc<dyn ProtocolEngine>, options: ContainerOptions) -> Self {
        let container_id = options
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Container {
            inner: Arc::new(ContainerInner {
                engine,
                container_id,
                listeners: ListenerSet::new(),
                ids: options.id_sequence.unwrap_or_default(),
            }),
        }
    }

    /// This container's id.
    pub fn container_id(&self) -> &str {
        self.inner.container_id()
    }

    /// Register a container-scoped fallback handler. Handlers here may
    /// be invoked from any connection's processing pass.
    pub fn on(&self, event: EventType, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.inner.listeners.register(event, handler);
    }

    /// Open a client connection.
    ///
    /// When the initial socket cannot be established and reconnect is
    /// enabled, the connection is still returned and a retry is
    /// scheduled, mirroring a mid-life transport failure. With reconnect
    /// disabled the failure is returned directly.
    pub async fn connect(&self, options: ConnectOptions) -> Result<Connection> {
        let connection = Connection::new(self.inner.clone(), Some(options));
        if let Err(err) = crate::net::connect_socket(&connection).await {
            if connection.options().is_some_and(|o| o.reconnect) {
                warn!(id = %connection.id(), error = %err, "initial connect failed; scheduling retry");
                crate::net::schedule_reconnect(connection.clone());
            } else {
                return Err(err);
            }
        }
        Ok(connection)
    }

    /// Listen for inbound connections, wrapping each accepted socket in
    /// a server-side connection. Server connections never reconnect.
    pub async fn listen(&self, options: ListenOptions) -> Result<Listener> {
        let listener = TcpListener::bind((options.host.as_str(), options.port))
            .await
            .map_err(|e| TetherError::listen(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TetherError::listen(e.to_string()))?;
        info!(addr = %local_addr, "listening");
        let inner = self.inner.clone();
        let handle = tokio::spawn(crate::net::run_listener(listener, inner));
        Ok(Listener { local_addr, handle })
    }

    /// Wrap an externally provided byte stream as a connection: `sink`
    /// carries outbound bytes, and the caller feeds inbound bytes via
    /// [`Connection::input`]. This is the seam `listen` uses internally
    /// and the one non-TCP transports or tests plug into.
    pub fn accept(&self, sink: Box<dyn WireSink>) -> Connection {
        let connection = Connection::new(self.inner.clone(), None);
        connection.attach_sink(sink);
        connection
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("container_id", &self.inner.container_id)
            .finish()
    }
}

/// Handle on a listening socket's accept loop.
#[derive(Debug)]
pub struct Listener {
    local_addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl Listener {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. Existing connections are unaffected.
    pub fn close(&self) {
        self.handle.abort();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
