//! Connection: the adapter's state machine heartbeat
//!
//! A connection owns one engine connection, the transport currently bound
//! to it, the event collector, the pending-input buffer, and the link
//! registry. Its process loop drains the collector, translates each
//! protocol event into lifecycle handling plus an application event
//! through the fallback chain, and pumps resulting output back toward
//! the socket until the engine goes quiet.
//!
//! The loop is non-reentrant per connection: handlers invoked during
//! dispatch may call operations (send, flow, close) that would otherwise
//! recurse into the loop mid-drain. A compare-exchange on an atomic flag
//! turns those nested calls into no-ops; the outer pass picks up whatever
//! events they produced.

use crate::config::{ConnectOptions, LinkOptions, DEFAULT_PREFETCH};
use crate::container::ContainerInner;
use crate::dispatch::{dispatch, ListenerSet};
use crate::events::{Event, EventType};
use crate::link::{LinkHandle, Receiver, Sender};
use crate::message::Message;
use crate::reconnect::ReconnectState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tether_engine::{
    DeliveryOutcome, EngineConnection, EngineEvent, EngineSession, EngineTransport, EventCollector,
    EventKind, LinkSpec, ProtocolEngine, TransportOutput,
};
use tracing::{debug, warn};

/// Upper bound on bytes taken from the transport per output pass.
const OUTPUT_CHUNK: usize = 10 * 1024;

/// Outbound half of whatever byte stream carries this connection.
///
/// Writes are fire-and-forget from the adapter's perspective; socket
/// write backpressure is the sink implementation's problem.
pub trait WireSink: Send {
    /// Queue bytes for the peer.
    fn write(&mut self, bytes: Vec<u8>);

    /// No more bytes will follow.
    fn end(&mut self);
}

struct ConnectionState {
    transport: Option<Arc<dyn EngineTransport>>,
    session: Option<Arc<dyn EngineSession>>,
    links: HashMap<String, LinkHandle>,
    pending: Vec<u8>,
    sink: Option<Box<dyn WireSink>>,
    reconnect: ReconnectState,
    freed: bool,
}

pub(crate) struct ConnectionInner {
    id: String,
    container: Arc<ContainerInner>,
    conn: Arc<dyn EngineConnection>,
    collector: Arc<dyn EventCollector>,
    options: Option<ConnectOptions>,
    listeners: ListenerSet,
    /// True only while the drain-dispatch-output loop runs.
    in_process: AtomicBool,
    state: Mutex<ConnectionState>,
}

/// A single AMQP connection, client- or server-side.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Build a connection over a fresh engine connection with a fresh
    /// transport bound to it. Client connections (those with options)
    /// open their local end immediately; accepted connections wait for
    /// the peer's open and answer it. Either way the open frame reaches
    /// the wire once a sink is attached and a process pass runs.
    pub(crate) fn new(container: Arc<ContainerInner>, options: Option<ConnectOptions>) -> Self {
        let engine = container.engine();
        let conn = engine.connection();
        let collector = engine.collector();
        conn.collect(collector.clone());

        let container_id = options
            .as_ref()
            .and_then(|o| o.container_id.clone())
            .unwrap_or_else(|| container.container_id().to_string());
        conn.set_container_id(&container_id);
        if let Some(opts) = &options {
            if let (Some(user), Some(pass)) = (&opts.username, &opts.password) {
                conn.set_credentials(user, pass);
            }
        }
        if options.is_some() {
            conn.open();
        }

        let transport = engine.transport();
        transport.bind(&conn);

        let id = format!("connection-{}", container.ids().next());
        Connection {
            inner: Arc::new(ConnectionInner {
                id,
                container,
                conn,
                collector,
                options,
                listeners: ListenerSet::new(),
                in_process: AtomicBool::new(false),
                state: Mutex::new(ConnectionState {
                    transport: Some(transport),
                    session: None,
                    links: HashMap::new(),
                    pending: Vec::new(),
                    sink: None,
                    reconnect: ReconnectState::default(),
                    freed: false,
                }),
            }),
        }
    }

    /// Adapter-assigned connection id, e.g. `connection-1`.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Container id announced on this connection.
    pub fn container_id(&self) -> String {
        self.inner.conn.container_id()
    }

    /// Register a connection-scoped event handler.
    pub fn on(&self, event: EventType, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.inner.listeners.register(event, handler);
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn engine(&self) -> Arc<dyn ProtocolEngine> {
        self.inner.container.engine()
    }

    pub(crate) fn options(&self) -> Option<&ConnectOptions> {
        self.inner.options.as_ref()
    }

    // ------------------------------------------------------------------
    // Byte pump
    // ------------------------------------------------------------------

    /// Feed inbound socket bytes.
    ///
    /// Bytes land in a pending buffer, then get pushed into the
    /// transport in a loop: a single push may consume only part of the
    /// buffer, and capacity can free up after an event-processing pass,
    /// so the loop continues while the transport keeps accepting a
    /// non-zero amount.
    pub fn input(&self, bytes: &[u8]) {
        let transport = {
            let mut state = self.state();
            state.pending.extend_from_slice(bytes);
            state.transport.clone()
        };
        let Some(transport) = transport else {
            debug!(id = %self.inner.id, "input with no transport bound; buffering");
            return;
        };
        loop {
            let chunk = {
                let state = self.state();
                state.pending.clone()
            };
            if chunk.is_empty() {
                break;
            }
            let consumed = transport.push(&chunk);
            if consumed > 0 {
                let mut state = self.state();
                let take = consumed.min(state.pending.len());
                state.pending.drain(..take);
            }
            self.process();
            if consumed == 0 {
                break;
            }
        }
    }

    /// One output pass: move up to [`OUTPUT_CHUNK`] pending outbound
    /// bytes from the transport to the sink. Returns true if bytes were
    /// written (more may remain). End-of-stream is not an error, just
    /// false.
    fn output(&self) -> bool {
        let transport = {
            let state = self.state();
            state.transport.clone()
        };
        let Some(transport) = transport else {
            return false;
        };
        match transport.peek(OUTPUT_CHUNK) {
            TransportOutput::Bytes(data) if !data.is_empty() => {
                let len = data.len();
                let wrote = {
                    let mut state = self.state();
                    match state.sink.as_mut() {
                        Some(sink) => {
                            sink.write(data);
                            true
                        }
                        // No sink attached (post-eof or pre-attach);
                        // the bytes stay pending on the transport.
                        None => false,
                    }
                };
                if wrote {
                    transport.pop(len);
                }
                wrote
            }
            TransportOutput::Bytes(_) | TransportOutput::Pending | TransportOutput::End => false,
        }
    }

    /// Socket error or peer hangup.
    ///
    /// Closes both transport directions so the engine can finalize
    /// protocol state, then, unless close negotiation had already
    /// completed, raises `disconnected` through the connection/container
    /// chain (the per-link chain may no longer exist) and schedules a
    /// reconnect attempt when enabled.
    pub fn eof(&self, error: Option<String>) {
        debug!(id = %self.inner.id, error = ?error, "transport eof");
        let transport = {
            let mut state = self.state();
            state.sink = None;
            state.transport.clone()
        };
        if let Some(transport) = transport {
            transport.close_head();
            transport.close_tail();
        }
        self.process();

        if self.inner.conn.state().is_fully_closed() {
            return;
        }
        self.dispatch_connection(Event::Disconnected {
            connection: self.clone(),
            error,
        });
        if self.options().is_some_and(|o| o.reconnect) {
            crate::net::schedule_reconnect(self.clone());
        }
    }

    // ------------------------------------------------------------------
    // Process loop
    // ------------------------------------------------------------------

    /// Drain the event collector and pump output until quiescent.
    ///
    /// Invoked after every externally triggered change (data arrival,
    /// local API call). Re-entrant calls return immediately; the
    /// in-flight pass picks up any events they generated. After the flag
    /// clears, the pass re-checks for work that another thread enqueued
    /// while its own call was still no-oping on the flag, and claims the
    /// loop again. Iterative, so stack depth is independent of event
    /// count.
    pub fn process(&self) {
        loop {
            if self
                .inner
                .in_process
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            loop {
                let mut drained = false;
                while let Some(event) = self.inner.collector.peek() {
                    self.translate(event.as_ref());
                    self.inner.collector.pop();
                    drained = true;
                }
                let wrote = self.output();
                if !drained && !wrote {
                    break;
                }
            }
            self.inner.in_process.store(false, Ordering::Release);
            if self.inner.collector.peek().is_none() && !self.has_pending_output() {
                return;
            }
        }
    }

    /// True when the transport holds outbound bytes and a sink is
    /// attached to receive them.
    fn has_pending_output(&self) -> bool {
        let transport = {
            let state = self.state();
            if state.sink.is_none() {
                return false;
            }
            state.transport.clone()
        };
        match transport {
            Some(transport) => {
                matches!(transport.peek(1), TransportOutput::Bytes(b) if !b.is_empty())
            }
            None => false,
        }
    }

    /// Fixed event-kind table. Unmapped kinds are drained and dropped.
    fn translate(&self, event: &dyn EngineEvent) {
        match event.kind() {
            EventKind::ConnectionRemoteOpen => self.on_connection_remote_open(),
            EventKind::ConnectionRemoteClose => self.on_connection_remote_close(),
            EventKind::SessionRemoteOpen => self.on_session_remote_open(event),
            EventKind::LinkRemoteOpen => self.on_link_remote_open(event),
            EventKind::LinkRemoteClose => self.on_link_remote_close(event),
            EventKind::LinkFlow => self.on_link_flow(event),
            EventKind::Delivery => self.on_delivery(event),
            EventKind::TransportClosed => self.on_transport_closed(),
            EventKind::SessionRemoteClose | EventKind::Transport => {}
        }
    }

    fn on_connection_remote_open(&self) {
        let state = self.inner.conn.state();
        if state.is_local_active() {
            self.dispatch_connection(Event::ConnectionOpened(self.clone()));
        } else if state.is_local_uninit() {
            self.dispatch_connection(Event::ConnectionOpening(self.clone()));
            self.inner.conn.open();
        } else {
            warn!(id = %self.inner.id, state = state.bits(), "unexpected connection state on remote open");
        }
    }

    fn on_connection_remote_close(&self) {
        let state = self.inner.conn.state();
        if state.is_local_closed() {
            self.dispatch_connection(Event::ConnectionClosed(self.clone()));
            self.release();
        } else if state.is_local_active() {
            self.dispatch_connection(Event::ConnectionClosing(self.clone()));
            self.inner.conn.close();
        } else {
            warn!(id = %self.inner.id, state = state.bits(), "unexpected connection state on remote close");
        }
    }

    fn on_session_remote_open(&self, event: &dyn EngineEvent) {
        let Some(session) = event.session() else {
            return;
        };
        if !session.state().is_local_uninit() {
            return;
        }
        let adopted = {
            let mut state = self.state();
            if state.session.is_none() {
                state.session = Some(session.clone());
                true
            } else {
                false
            }
        };
        if adopted {
            session.open();
        } else {
            // Fixed one-session-per-connection policy: extra inbound
            // sessions are observed but never opened.
            warn!(id = %self.inner.id, "additional remote session ignored");
        }
    }

    fn on_link_remote_open(&self, event: &dyn EngineEvent) {
        let Some(link) = event.link() else {
            return;
        };
        let name = link.name();
        let handle = {
            let state = self.state();
            state.links.get(&name).cloned()
        };
        let handle = match handle {
            Some(handle) => handle,
            None => {
                // Peer-initiated link: synthesize a wrapper from the
                // engine-reported directionality.
                let handle = if link.is_sender() {
                    LinkHandle::Sender(Sender::new(self.clone(), link.clone()))
                } else {
                    LinkHandle::Receiver(Receiver::new(self.clone(), link.clone(), DEFAULT_PREFETCH))
                };
                debug!(id = %self.inner.id, link = %name, "link open initiated by peer");
                let mut state = self.state();
                state.links.insert(name.clone(), handle.clone());
                handle
            }
        };

        let link_state = handle.engine_link().state();
        if link_state.is_local_active() {
            self.dispatch_link(&handle, handle.opened_event());
        } else if link_state.is_local_uninit() {
            self.dispatch_link(&handle, handle.opening_event());
            handle.engine_link().open();
            if let LinkHandle::Receiver(receiver) = &handle {
                receiver.grant_prefetch();
            }
        } else {
            warn!(id = %self.inner.id, link = %name, state = link_state.bits(), "unexpected link state on remote open");
        }
    }

    fn on_link_remote_close(&self, event: &dyn EngineEvent) {
        let Some(link) = event.link() else {
            return;
        };
        if link.state().is_local_active() {
            link.close();
        }
        if link.state().is_local_closed() {
            let name = link.name();
            let mut state = self.state();
            state.links.remove(&name);
        }
    }

    fn on_link_flow(&self, event: &dyn EngineEvent) {
        let Some(link) = event.link() else {
            return;
        };
        if !link.is_sender() || link.credit() == 0 {
            return;
        }
        let handle = {
            let state = self.state();
            state.links.get(&link.name()).cloned()
        };
        if let Some(LinkHandle::Sender(sender)) = handle {
            self.dispatch_link(&LinkHandle::Sender(sender.clone()), Event::Sendable(sender));
        }
    }

    fn on_delivery(&self, event: &dyn EngineEvent) {
        let (Some(link), Some(delivery)) = (event.link(), event.delivery()) else {
            return;
        };
        let handle = {
            let state = self.state();
            state.links.get(&link.name()).cloned()
        };
        let Some(handle) = handle else {
            debug!(id = %self.inner.id, link = %link.name(), "delivery for unknown link");
            return;
        };
        match handle {
            LinkHandle::Sender(sender) => {
                if delivery.updated() {
                    let outcome = delivery.remote_outcome();
                    match outcome {
                        Some(DeliveryOutcome::Accepted) => {
                            self.dispatch_link(
                                &LinkHandle::Sender(sender.clone()),
                                Event::Accepted(sender.clone()),
                            );
                        }
                        Some(DeliveryOutcome::Released) | Some(DeliveryOutcome::Modified) => {
                            self.dispatch_link(
                                &LinkHandle::Sender(sender.clone()),
                                Event::Released(sender.clone()),
                            );
                        }
                        Some(DeliveryOutcome::Rejected) => {
                            self.dispatch_link(
                                &LinkHandle::Sender(sender.clone()),
                                Event::Rejected(sender.clone()),
                            );
                        }
                        None => {}
                    }
                    // Once a terminal outcome is observed the adapter
                    // settles locally so engine resources are reclaimed,
                    // whether or not the peer pre-settled.
                    if outcome.is_some() && !delivery.settled() {
                        delivery.settle();
                    }
                }
                if delivery.settled() {
                    self.dispatch_link(&LinkHandle::Sender(sender.clone()), Event::Settled(sender));
                }
            }
            LinkHandle::Receiver(receiver) => {
                let mut codec = self.engine().message();
                if link.recv(codec.as_mut()) {
                    let message = Message::from_codec(codec.as_ref());
                    self.dispatch_link(
                        &LinkHandle::Receiver(receiver.clone()),
                        Event::Message {
                            receiver: receiver.clone(),
                            message,
                        },
                    );
                    receiver.replenish();
                    // Auto-accept policy: no reject/release path is
                    // exposed to the application.
                    delivery.set_local_outcome(DeliveryOutcome::Accepted);
                    delivery.settle();
                } else {
                    // Partial message; wait for more data.
                    debug!(id = %self.inner.id, link = %link.name(), "incoming delivery incomplete");
                }
            }
        }
    }

    fn on_transport_closed(&self) {
        if self.inner.conn.state().is_fully_closed() {
            let sink = {
                let mut state = self.state();
                state.sink.take()
            };
            if let Some(mut sink) = sink {
                sink.end();
            }
        }
    }

    // ------------------------------------------------------------------
    // Dispatch plumbing
    // ------------------------------------------------------------------

    fn dispatch_connection(&self, event: Event) {
        dispatch(
            &[&self.inner.listeners, self.inner.container.listeners()],
            &event,
        );
    }

    fn dispatch_link(&self, handle: &LinkHandle, event: Event) {
        dispatch(
            &[
                handle.listeners(),
                &self.inner.listeners,
                self.inner.container.listeners(),
            ],
            &event,
        );
    }

    // ------------------------------------------------------------------
    // Link creation & naming
    // ------------------------------------------------------------------

    /// The connection's single session, created and opened on first use.
    fn session(&self) -> Arc<dyn EngineSession> {
        let existing = {
            let state = self.state();
            state.session.clone()
        };
        if let Some(session) = existing {
            return session;
        }
        let session = self.inner.conn.create_session();
        session.open();
        let mut state = self.state();
        state.session = Some(session.clone());
        session
    }

    /// Default link name: container id plus the source and/or target
    /// address, or a fixed `_link` suffix when neither is given. Stable
    /// across connects so reconnecting links reuse their names.
    fn generate_link_name(&self, options: &LinkOptions) -> String {
        let mut name = self.container_id();
        let source = options.source.as_ref().map(|t| t.address());
        let target = options.target.as_ref().map(|t| t.address());
        if let Some(source) = source {
            name.push('_');
            name.push_str(source);
        }
        if let Some(target) = target {
            name.push('_');
            name.push_str(target);
        }
        if source.is_none() && target.is_none() {
            name.push_str("_link");
        }
        name
    }

    /// Disambiguate against the registry by appending `_1`, `_2`, …
    /// until no collision remains. Caller-supplied names pass through
    /// here too.
    fn unique_link_name(&self, base: &str) -> String {
        let state = self.state();
        let mut name = base.to_string();
        let mut counter = 1;
        while state.links.contains_key(&name) {
            name = format!("{base}_{counter}");
            counter += 1;
        }
        name
    }

    fn link_spec(options: &LinkOptions) -> LinkSpec {
        LinkSpec {
            source: options.source.as_ref().map(|t| t.address().to_string()),
            target: options.target.as_ref().map(|t| t.address().to_string()),
            durable: options.durable,
        }
    }

    /// Create a sender link on this connection.
    pub fn create_sender(&self, options: LinkOptions) -> Sender {
        let base = options
            .name
            .clone()
            .unwrap_or_else(|| self.generate_link_name(&options));
        let name = self.unique_link_name(&base);
        let link = self.session().create_sender(&name, &Self::link_spec(&options));
        let sender = Sender::new(self.clone(), link.clone());
        {
            let mut state = self.state();
            state
                .links
                .insert(name.clone(), LinkHandle::Sender(sender.clone()));
        }
        link.open();
        debug!(id = %self.inner.id, link = %name, "sender created");
        self.process();
        sender
    }

    /// Create a receiver link on this connection. The initial prefetch
    /// window is issued immediately unless prefetch is 0.
    pub fn create_receiver(&self, options: LinkOptions) -> Receiver {
        let base = options
            .name
            .clone()
            .unwrap_or_else(|| self.generate_link_name(&options));
        let name = self.unique_link_name(&base);
        let prefetch = options.effective_prefetch();
        let link = self
            .session()
            .create_receiver(&name, &Self::link_spec(&options));
        let receiver = Receiver::new(self.clone(), link.clone(), prefetch);
        {
            let mut state = self.state();
            state
                .links
                .insert(name.clone(), LinkHandle::Receiver(receiver.clone()));
        }
        link.open();
        receiver.grant_prefetch();
        debug!(id = %self.inner.id, link = %name, prefetch, "receiver created");
        self.process();
        receiver
    }

    /// Names currently registered on this connection.
    pub fn link_names(&self) -> Vec<String> {
        let state = self.state();
        state.links.keys().cloned().collect()
    }

    /// Request closure. Engine resources are released once the remote
    /// close is observed.
    pub fn close(&self) {
        self.inner.conn.close();
        self.process();
    }

    // ------------------------------------------------------------------
    // Transport & socket lifecycle
    // ------------------------------------------------------------------

    /// Attach the outbound half of a byte stream and flush anything the
    /// engine already has queued (protocol header, open frames).
    pub fn attach_sink(&self, sink: Box<dyn WireSink>) {
        {
            let mut state = self.state();
            state.sink = Some(sink);
        }
        self.process();
    }

    /// Replace the transport for a reconnect attempt: unbind and free
    /// the previous one, clear stale pending input, and bind a fresh
    /// transport to the same engine connection so its identity (container
    /// id, delivery history) carries over.
    pub(crate) fn rebind_transport(&self) {
        let old = {
            let mut state = self.state();
            state.pending.clear();
            state.sink = None;
            state.transport.take()
        };
        if let Some(old) = old {
            old.unbind();
            old.free();
        }
        let transport = self.engine().transport();
        transport.bind(&self.inner.conn);
        let mut state = self.state();
        state.transport = Some(transport);
    }

    /// Claim the next reconnect attempt, if the policy allows one more.
    /// Returns the attempt number and the delay to wait first.
    pub(crate) fn begin_reconnect_attempt(&self) -> Option<(u32, Duration)> {
        let options = self.options()?;
        let config = &options.reconnect_config;
        let mut state = self.state();
        state.reconnect.attempts += 1;
        let attempt = state.reconnect.attempts;
        if attempt > config.max_attempts {
            None
        } else {
            Some((attempt, config.delay_for(attempt)))
        }
    }

    /// A socket is healthy again; further failures restart the backoff.
    pub(crate) fn reset_reconnect(&self) {
        let mut state = self.state();
        state.reconnect.attempts = 0;
    }

    /// Next host in the failover rotation.
    pub(crate) fn next_host(&self) -> Option<(String, u16)> {
        let options = self.options()?;
        let hosts = options.hosts();
        if hosts.is_empty() {
            return None;
        }
        let mut state = self.state();
        let host = hosts[state.reconnect.host_index % hosts.len()].clone();
        state.reconnect.host_index += 1;
        Some((host, options.port))
    }

    /// Retry budget exhausted: emit a final `disconnected` and release.
    pub(crate) fn reconnect_exhausted(&self) {
        warn!(id = %self.inner.id, "reconnect attempts exhausted");
        self.dispatch_connection(Event::Disconnected {
            connection: self.clone(),
            error: Some("reconnect attempts exhausted".to_string()),
        });
        self.release();
    }

    /// Release engine resources. Idempotent; called once both close
    /// halves have been observed, or on terminal failure.
    fn release(&self) {
        let (transport, sink) = {
            let mut state = self.state();
            if state.freed {
                return;
            }
            state.freed = true;
            (state.transport.take(), state.sink.take())
        };
        if let Some(transport) = transport {
            transport.unbind();
            transport.free();
        }
        if let Some(mut sink) = sink {
            sink.end();
        }
        self.inner.conn.free();
        debug!(id = %self.inner.id, "connection released");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("id", &self.inner.id).finish()
    }
}
