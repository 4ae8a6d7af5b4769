//! Shared harness for adapter integration tests: a capturing sink and a
//! pre-opened connection over the scripted engine.
#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_adapter::{Connection, Container, ContainerOptions, EventType, WireSink};
use tether_testkit::{EventLog, ScriptedConnection, ScriptedEngine, ScriptedTransport};

/// Every application event type, for blanket listener registration.
pub const ALL_EVENT_TYPES: [EventType; 15] = [
    EventType::ConnectionOpening,
    EventType::ConnectionOpened,
    EventType::ConnectionClosing,
    EventType::ConnectionClosed,
    EventType::Disconnected,
    EventType::SenderOpening,
    EventType::SenderOpened,
    EventType::ReceiverOpening,
    EventType::ReceiverOpened,
    EventType::Sendable,
    EventType::Message,
    EventType::Accepted,
    EventType::Released,
    EventType::Rejected,
    EventType::Settled,
];

/// Register a container backstop listener for every event type and
/// return the log they all feed.
pub fn log_all(container: &Container) -> EventLog<EventType> {
    let log = EventLog::new();
    for ty in ALL_EVENT_TYPES {
        let log = log.clone();
        container.on(ty, move |event| log.push(event.event_type()));
    }
    log
}

#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    write_sizes: Vec<usize>,
    ended: bool,
}

/// A sink that records everything written to it.
#[derive(Clone, Default)]
pub struct CaptureSink {
    inner: Arc<Mutex<Captured>>,
}

impl CaptureSink {
    pub fn boxed(&self) -> Box<dyn WireSink> {
        Box::new(self.clone())
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().unwrap().bytes.clone()
    }

    pub fn write_sizes(&self) -> Vec<usize> {
        self.inner.lock().unwrap().write_sizes.clone()
    }

    pub fn ended(&self) -> bool {
        self.inner.lock().unwrap().ended
    }
}

impl WireSink for CaptureSink {
    fn write(&mut self, bytes: Vec<u8>) {
        let mut captured = self.inner.lock().unwrap();
        captured.write_sizes.push(bytes.len());
        captured.bytes.extend_from_slice(&bytes);
    }

    fn end(&mut self) {
        self.inner.lock().unwrap().ended = true;
    }
}

/// An accepted connection with its scripted peer objects in reach.
pub struct Peer {
    pub engine: ScriptedEngine,
    pub container: Container,
    pub sink: CaptureSink,
    pub connection: Connection,
    pub conn: Arc<ScriptedConnection>,
    pub transport: Arc<ScriptedTransport>,
}

/// Install the test log subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A container with a fixed id over a fresh scripted engine.
pub fn container(id: &str) -> (ScriptedEngine, Container) {
    init_tracing();
    let engine = ScriptedEngine::new();
    let container = Container::with_options(
        Arc::new(engine.clone()),
        ContainerOptions {
            id: Some(id.to_string()),
            ..ContainerOptions::default()
        },
    );
    (engine, container)
}

/// Accept a connection over a capturing sink and complete the open
/// handshake from the scripted peer.
pub fn accepted(container_id: &str) -> Peer {
    let (engine, container) = container(container_id);
    let sink = CaptureSink::default();
    let connection = container.accept(sink.boxed());
    let conn = engine.last_connection().expect("connection created");
    let transport = engine.last_transport().expect("transport created");
    conn.remote_open();
    connection.process();
    Peer {
        engine,
        container,
        sink,
        connection,
        conn,
        transport,
    }
}

/// Poll `cond` until it holds or a 2 second deadline passes.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
