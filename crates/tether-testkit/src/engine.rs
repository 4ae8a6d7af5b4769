//! Scripted protocol engine
//!
//! Implements every `tether-engine` trait in memory with no wire format
//! at all: outbound "frames" are whatever bytes a test queues on the
//! transport, and protocol events are pushed explicitly by test helpers
//! (`remote_open`, `grant_credit`, `deliver`, …). Everything the adapter
//! does in response is recorded and queryable.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tether_engine::{
    DeliveryOutcome, EndpointState, EngineConnection, EngineDelivery, EngineEvent, EngineLink,
    EngineSession, EngineTransport, EventCollector, EventKind, FieldValue, LinkSpec, MessageCodec,
    MessageField, ProtocolEngine, TransportOutput,
};

/// Message contents as a plain field map.
pub type FieldMap = HashMap<MessageField, FieldValue>;

/// Every field the codec boundary enumerates.
pub const ALL_FIELDS: [MessageField; 9] = [
    MessageField::Body,
    MessageField::To,
    MessageField::Subject,
    MessageField::ReplyTo,
    MessageField::CorrelationId,
    MessageField::ContentType,
    MessageField::Durable,
    MessageField::Ttl,
    MessageField::Priority,
];

/// A field map holding only a text body, the common test payload.
pub fn text_message(body: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(MessageField::Body, FieldValue::Text(body.to_string()));
    fields
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn snapshot_fields(codec: &dyn MessageCodec) -> FieldMap {
    let mut fields = FieldMap::new();
    for field in ALL_FIELDS {
        if let Some(value) = codec.field(field) {
            fields.insert(field, value);
        }
    }
    fields
}

fn load_fields(codec: &mut dyn MessageCodec, fields: &FieldMap) {
    for (field, value) in fields {
        codec.set_field(*field, value.clone());
    }
}

const LOCAL_MASK: u8 = 0b0000_0111;
const REMOTE_MASK: u8 = 0b0011_1000;

fn set_local(state: &Mutex<EndpointState>, to: EndpointState) {
    let mut guard = lock(state);
    *guard = EndpointState::from_bits((guard.bits() & !LOCAL_MASK) | to.bits());
}

fn set_remote(state: &Mutex<EndpointState>, to: EndpointState) {
    let mut guard = lock(state);
    *guard = EndpointState::from_bits((guard.bits() & !REMOTE_MASK) | to.bits());
}

// ----------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------

/// In-memory message: a bag of typed fields, no encoding.
#[derive(Debug, Default)]
pub struct ScriptedMessage {
    fields: FieldMap,
}

impl MessageCodec for ScriptedMessage {
    fn set_field(&mut self, field: MessageField, value: FieldValue) {
        self.fields.insert(field, value);
    }

    fn field(&self, field: MessageField) -> Option<FieldValue> {
        self.fields.get(&field).cloned()
    }
}

// ----------------------------------------------------------------------
// Events & collector
// ----------------------------------------------------------------------

/// A hand-built protocol event.
pub struct ScriptedEvent {
    kind: EventKind,
    connection: Option<Arc<dyn EngineConnection>>,
    session: Option<Arc<dyn EngineSession>>,
    link: Option<Arc<dyn EngineLink>>,
    delivery: Option<Arc<dyn EngineDelivery>>,
}

impl ScriptedEvent {
    /// An event of `kind` with no endpoint references.
    pub fn new(kind: EventKind) -> Self {
        ScriptedEvent {
            kind,
            connection: None,
            session: None,
            link: None,
            delivery: None,
        }
    }

    /// Attach a session reference.
    pub fn with_session(mut self, session: Arc<dyn EngineSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Attach a link reference.
    pub fn with_link(mut self, link: Arc<dyn EngineLink>) -> Self {
        self.link = Some(link);
        self
    }

    /// Attach a delivery reference.
    pub fn with_delivery(mut self, delivery: Arc<dyn EngineDelivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    fn with_connection(mut self, connection: Arc<dyn EngineConnection>) -> Self {
        self.connection = Some(connection);
        self
    }
}

impl EngineEvent for ScriptedEvent {
    fn kind(&self) -> EventKind {
        self.kind
    }

    fn connection(&self) -> Option<Arc<dyn EngineConnection>> {
        self.connection.clone()
    }

    fn session(&self) -> Option<Arc<dyn EngineSession>> {
        self.session.clone()
    }

    fn link(&self) -> Option<Arc<dyn EngineLink>> {
        self.link.clone()
    }

    fn delivery(&self) -> Option<Arc<dyn EngineDelivery>> {
        self.delivery.clone()
    }
}

/// FIFO event queue with explicit push for tests.
#[derive(Default)]
pub struct ScriptedCollector {
    queue: Mutex<VecDeque<Arc<ScriptedEvent>>>,
}

impl ScriptedCollector {
    /// Enqueue an event for the adapter to drain.
    pub fn push(&self, event: ScriptedEvent) {
        lock(&self.queue).push_back(Arc::new(event));
    }

    /// Events currently queued (i.e. not yet drained).
    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl EventCollector for ScriptedCollector {
    fn peek(&self) -> Option<Arc<dyn EngineEvent>> {
        lock(&self.queue)
            .front()
            .cloned()
            .map(|e| e as Arc<dyn EngineEvent>)
    }

    fn pop(&self) {
        lock(&self.queue).pop_front();
    }
}

// ----------------------------------------------------------------------
// Delivery
// ----------------------------------------------------------------------

/// One scripted delivery, shared between the peer script and the adapter.
#[derive(Default)]
pub struct ScriptedDelivery {
    updated: AtomicBool,
    settled: AtomicBool,
    remote_outcome: Mutex<Option<DeliveryOutcome>>,
    local_outcome: Mutex<Option<DeliveryOutcome>>,
    settle_calls: AtomicUsize,
}

impl ScriptedDelivery {
    /// How many times the adapter called `settle`.
    pub fn settle_count(&self) -> usize {
        self.settle_calls.load(Ordering::SeqCst)
    }
}

impl EngineDelivery for ScriptedDelivery {
    fn updated(&self) -> bool {
        self.updated.load(Ordering::SeqCst)
    }

    fn settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    fn remote_outcome(&self) -> Option<DeliveryOutcome> {
        *lock(&self.remote_outcome)
    }

    fn local_outcome(&self) -> Option<DeliveryOutcome> {
        *lock(&self.local_outcome)
    }

    fn set_local_outcome(&self, outcome: DeliveryOutcome) {
        *lock(&self.local_outcome) = Some(outcome);
    }

    fn settle(&self) {
        self.settled.store(true, Ordering::SeqCst);
        self.settle_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------
// Link
// ----------------------------------------------------------------------

/// A delivery the adapter queued for transmission.
#[derive(Debug, Clone)]
pub struct SentDelivery {
    /// Delivery tag the adapter supplied.
    pub tag: Vec<u8>,
    /// Message fields as marshalled through the codec.
    pub fields: FieldMap,
}

/// Scripted link endpoint. Created by the adapter (`create_sender` /
/// `create_receiver`) or by a scripted remote attach.
pub struct ScriptedLink {
    self_ref: Mutex<Weak<ScriptedLink>>,
    conn: Weak<ScriptedConnection>,
    name: String,
    sender: bool,
    spec: LinkSpec,
    state: Mutex<EndpointState>,
    credit: Mutex<u32>,
    flows: Mutex<Vec<u32>>,
    queued: Mutex<u32>,
    sent: Mutex<Vec<SentDelivery>>,
    incoming: Mutex<VecDeque<FieldMap>>,
    remote_source: Mutex<Option<String>>,
    remote_target: Mutex<Option<String>>,
    detached: AtomicBool,
}

impl ScriptedLink {
    fn new(
        conn: Weak<ScriptedConnection>,
        name: &str,
        sender: bool,
        spec: &LinkSpec,
        state: EndpointState,
    ) -> Arc<Self> {
        let link = Arc::new(ScriptedLink {
            self_ref: Mutex::new(Weak::new()),
            conn,
            name: name.to_string(),
            sender,
            spec: spec.clone(),
            state: Mutex::new(state),
            credit: Mutex::new(0),
            flows: Mutex::new(Vec::new()),
            queued: Mutex::new(0),
            sent: Mutex::new(Vec::new()),
            incoming: Mutex::new(VecDeque::new()),
            remote_source: Mutex::new(spec.source.clone()),
            remote_target: Mutex::new(spec.target.clone()),
            detached: AtomicBool::new(false),
        });
        *lock(&link.self_ref) = Arc::downgrade(&link);
        link
    }

    fn as_engine_link(&self) -> Option<Arc<dyn EngineLink>> {
        lock(&self.self_ref).upgrade().map(|l| l as Arc<dyn EngineLink>)
    }

    fn push_event(&self, event: ScriptedEvent) {
        if let Some(conn) = self.conn.upgrade() {
            conn.push_event(event);
        }
    }

    fn link_event(&self, kind: EventKind) -> Option<ScriptedEvent> {
        self.as_engine_link()
            .map(|link| ScriptedEvent::new(kind).with_link(link))
    }

    /// Attach-time configuration the adapter supplied.
    pub fn spec(&self) -> &LinkSpec {
        &self.spec
    }

    /// Every credit amount the adapter flowed, in order.
    pub fn flows(&self) -> Vec<u32> {
        lock(&self.flows).clone()
    }

    /// Every delivery the adapter queued, in order.
    pub fn sent(&self) -> Vec<SentDelivery> {
        lock(&self.sent).clone()
    }

    /// True once `detach` was called.
    pub fn was_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// Script the remote source/target addresses the peer announced.
    pub fn set_remote_addresses(&self, source: Option<&str>, target: Option<&str>) {
        *lock(&self.remote_source) = source.map(str::to_string);
        *lock(&self.remote_target) = target.map(str::to_string);
    }

    /// Peer completes the attach handshake.
    pub fn remote_open(&self) {
        set_remote(&self.state, EndpointState::REMOTE_ACTIVE);
        if let Some(event) = self.link_event(EventKind::LinkRemoteOpen) {
            self.push_event(event);
        }
    }

    /// Peer detaches the link.
    pub fn remote_close(&self) {
        set_remote(&self.state, EndpointState::REMOTE_CLOSED);
        if let Some(event) = self.link_event(EventKind::LinkRemoteClose) {
            self.push_event(event);
        }
    }

    /// Peer grants sender credit and signals a flow event.
    pub fn grant_credit(&self, amount: u32) {
        *lock(&self.credit) += amount;
        if let Some(event) = self.link_event(EventKind::LinkFlow) {
            self.push_event(event);
        }
    }

    /// Peer transfers a complete message to this (receiver) link.
    pub fn deliver(&self, fields: FieldMap) -> Arc<ScriptedDelivery> {
        lock(&self.incoming).push_back(fields);
        let delivery = Arc::new(ScriptedDelivery::default());
        if let Some(event) = self.link_event(EventKind::Delivery) {
            self.push_event(event.with_delivery(delivery.clone()));
        }
        delivery
    }

    /// Peer starts a transfer but the message is not yet complete; the
    /// adapter's `recv` will return false.
    pub fn deliver_incomplete(&self) -> Arc<ScriptedDelivery> {
        let delivery = Arc::new(ScriptedDelivery::default());
        if let Some(event) = self.link_event(EventKind::Delivery) {
            self.push_event(event.with_delivery(delivery.clone()));
        }
        delivery
    }

    /// Remaining frames of an earlier incomplete transfer arrive.
    pub fn complete(&self, delivery: &Arc<ScriptedDelivery>, fields: FieldMap) {
        lock(&self.incoming).push_back(fields);
        if let Some(event) = self.link_event(EventKind::Delivery) {
            self.push_event(event.with_delivery(delivery.clone()));
        }
    }

    /// Peer reports a disposition for an outbound (sender) delivery.
    pub fn peer_disposition(
        &self,
        outcome: DeliveryOutcome,
        settled: bool,
    ) -> Arc<ScriptedDelivery> {
        let delivery = Arc::new(ScriptedDelivery::default());
        delivery.updated.store(true, Ordering::SeqCst);
        delivery.settled.store(settled, Ordering::SeqCst);
        *lock(&delivery.remote_outcome) = Some(outcome);
        if let Some(event) = self.link_event(EventKind::Delivery) {
            self.push_event(event.with_delivery(delivery.clone()));
        }
        delivery
    }
}

impl EngineLink for ScriptedLink {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_sender(&self) -> bool {
        self.sender
    }

    fn open(&self) {
        set_local(&self.state, EndpointState::LOCAL_ACTIVE);
    }

    fn close(&self) {
        set_local(&self.state, EndpointState::LOCAL_CLOSED);
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    fn state(&self) -> EndpointState {
        *lock(&self.state)
    }

    fn credit(&self) -> u32 {
        *lock(&self.credit)
    }

    fn queued(&self) -> u32 {
        *lock(&self.queued)
    }

    fn available(&self) -> u32 {
        lock(&self.incoming).len() as u32
    }

    fn flow(&self, credit: u32) {
        *lock(&self.credit) += credit;
        lock(&self.flows).push(credit);
    }

    fn send(&self, message: &dyn MessageCodec, tag: &[u8]) {
        lock(&self.sent).push(SentDelivery {
            tag: tag.to_vec(),
            fields: snapshot_fields(message),
        });
        *lock(&self.queued) += 1;
        let mut credit = lock(&self.credit);
        *credit = credit.saturating_sub(1);
    }

    fn recv(&self, message: &mut dyn MessageCodec) -> bool {
        match lock(&self.incoming).pop_front() {
            Some(fields) => {
                load_fields(message, &fields);
                let mut credit = lock(&self.credit);
                *credit = credit.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    fn remote_source_address(&self) -> Option<String> {
        lock(&self.remote_source).clone()
    }

    fn remote_target_address(&self) -> Option<String> {
        lock(&self.remote_target).clone()
    }
}

// ----------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------

/// Scripted session endpoint.
pub struct ScriptedSession {
    self_ref: Mutex<Weak<ScriptedSession>>,
    conn: Weak<ScriptedConnection>,
    state: Mutex<EndpointState>,
    links: Mutex<Vec<Arc<ScriptedLink>>>,
}

impl ScriptedSession {
    fn new(conn: Weak<ScriptedConnection>, state: EndpointState) -> Arc<Self> {
        let session = Arc::new(ScriptedSession {
            self_ref: Mutex::new(Weak::new()),
            conn,
            state: Mutex::new(state),
            links: Mutex::new(Vec::new()),
        });
        *lock(&session.self_ref) = Arc::downgrade(&session);
        session
    }

    fn make_link(&self, name: &str, sender: bool, spec: &LinkSpec, state: EndpointState) -> Arc<ScriptedLink> {
        let link = ScriptedLink::new(self.conn.clone(), name, sender, spec, state);
        lock(&self.links).push(link.clone());
        link
    }

    /// Links created on this session so far, in creation order.
    pub fn links(&self) -> Vec<Arc<ScriptedLink>> {
        lock(&self.links).clone()
    }

    /// Look up a link by name.
    pub fn link(&self, name: &str) -> Option<Arc<ScriptedLink>> {
        lock(&self.links).iter().find(|l| l.name == name).cloned()
    }

    /// Peer attaches a link on this session. `local_is_sender` gives the
    /// local role: a peer-initiated subscription makes the local end the
    /// sender.
    pub fn remote_attach(
        &self,
        name: &str,
        local_is_sender: bool,
        spec: &LinkSpec,
    ) -> Arc<ScriptedLink> {
        let state = EndpointState::LOCAL_UNINIT | EndpointState::REMOTE_ACTIVE;
        let link = self.make_link(name, local_is_sender, spec, state);
        link.remote_open_event_only();
        link
    }
}

impl ScriptedLink {
    // remote_attach already set REMOTE_ACTIVE at construction.
    fn remote_open_event_only(&self) {
        if let Some(event) = self.link_event(EventKind::LinkRemoteOpen) {
            self.push_event(event);
        }
    }
}

impl EngineSession for ScriptedSession {
    fn open(&self) {
        set_local(&self.state, EndpointState::LOCAL_ACTIVE);
    }

    fn state(&self) -> EndpointState {
        *lock(&self.state)
    }

    fn create_sender(&self, name: &str, spec: &LinkSpec) -> Arc<dyn EngineLink> {
        let state = EndpointState::LOCAL_UNINIT | EndpointState::REMOTE_UNINIT;
        self.make_link(name, true, spec, state)
    }

    fn create_receiver(&self, name: &str, spec: &LinkSpec) -> Arc<dyn EngineLink> {
        let state = EndpointState::LOCAL_UNINIT | EndpointState::REMOTE_UNINIT;
        self.make_link(name, false, spec, state)
    }
}

// ----------------------------------------------------------------------
// Connection
// ----------------------------------------------------------------------

/// Scripted connection endpoint.
pub struct ScriptedConnection {
    self_ref: Mutex<Weak<ScriptedConnection>>,
    core: Arc<EngineCore>,
    state: Mutex<EndpointState>,
    container_id: Mutex<String>,
    credentials: Mutex<Option<(String, String)>>,
    collector: Mutex<Option<Arc<ScriptedCollector>>>,
    sessions: Mutex<Vec<Arc<ScriptedSession>>>,
    freed: AtomicBool,
}

impl ScriptedConnection {
    fn new(core: Arc<EngineCore>) -> Arc<Self> {
        let conn = Arc::new(ScriptedConnection {
            self_ref: Mutex::new(Weak::new()),
            core,
            state: Mutex::new(EndpointState::LOCAL_UNINIT | EndpointState::REMOTE_UNINIT),
            container_id: Mutex::new(String::new()),
            credentials: Mutex::new(None),
            collector: Mutex::new(None),
            sessions: Mutex::new(Vec::new()),
            freed: AtomicBool::new(false),
        });
        *lock(&conn.self_ref) = Arc::downgrade(&conn);
        conn
    }

    fn as_engine_connection(&self) -> Option<Arc<dyn EngineConnection>> {
        lock(&self.self_ref)
            .upgrade()
            .map(|c| c as Arc<dyn EngineConnection>)
    }

    fn weak(&self) -> Weak<ScriptedConnection> {
        lock(&self.self_ref).clone()
    }

    /// Enqueue an event into this connection's collector. No-op when the
    /// adapter has not routed a collector yet.
    pub fn push_event(&self, event: ScriptedEvent) {
        if let Some(collector) = lock(&self.collector).clone() {
            collector.push(event);
        }
    }

    /// The collector the adapter routed events into.
    pub fn collector(&self) -> Option<Arc<ScriptedCollector>> {
        lock(&self.collector).clone()
    }

    /// Credentials the adapter configured, if any.
    pub fn credentials(&self) -> Option<(String, String)> {
        lock(&self.credentials).clone()
    }

    /// True once `free` was called.
    pub fn was_freed(&self) -> bool {
        self.freed.load(Ordering::SeqCst)
    }

    /// Sessions created so far (adapter- or peer-initiated).
    pub fn sessions(&self) -> Vec<Arc<ScriptedSession>> {
        lock(&self.sessions).clone()
    }

    /// Peer opens the connection.
    pub fn remote_open(&self) {
        set_remote(&self.state, EndpointState::REMOTE_ACTIVE);
        if let Some(conn) = self.as_engine_connection() {
            self.push_event(
                ScriptedEvent::new(EventKind::ConnectionRemoteOpen).with_connection(conn),
            );
        }
    }

    /// Peer closes the connection.
    pub fn remote_close(&self) {
        set_remote(&self.state, EndpointState::REMOTE_CLOSED);
        if let Some(conn) = self.as_engine_connection() {
            self.push_event(
                ScriptedEvent::new(EventKind::ConnectionRemoteClose).with_connection(conn),
            );
        }
    }

    /// Peer begins a session.
    pub fn remote_session_open(&self) -> Arc<ScriptedSession> {
        let state = EndpointState::LOCAL_UNINIT | EndpointState::REMOTE_ACTIVE;
        let session = ScriptedSession::new(self.weak(), state);
        lock(&self.sessions).push(session.clone());
        self.push_event(
            ScriptedEvent::new(EventKind::SessionRemoteOpen).with_session(session.clone()),
        );
        session
    }

    /// Transport reports both directions closed.
    pub fn transport_closed(&self) {
        self.push_event(ScriptedEvent::new(EventKind::TransportClosed));
    }
}

impl EngineConnection for ScriptedConnection {
    fn open(&self) {
        set_local(&self.state, EndpointState::LOCAL_ACTIVE);
    }

    fn close(&self) {
        set_local(&self.state, EndpointState::LOCAL_CLOSED);
    }

    fn state(&self) -> EndpointState {
        *lock(&self.state)
    }

    fn set_container_id(&self, id: &str) {
        *lock(&self.container_id) = id.to_string();
    }

    fn container_id(&self) -> String {
        lock(&self.container_id).clone()
    }

    fn set_credentials(&self, username: &str, password: &str) {
        *lock(&self.credentials) = Some((username.to_string(), password.to_string()));
    }

    fn collect(&self, collector: Arc<dyn EventCollector>) {
        // Match the handle back to the concrete collector this engine
        // created, by identity.
        let found = lock(&self.core.collectors)
            .iter()
            .find(|c| Arc::ptr_eq(&(Arc::clone(c) as Arc<dyn EventCollector>), &collector))
            .cloned();
        *lock(&self.collector) = found;
    }

    fn create_session(&self) -> Arc<dyn EngineSession> {
        let state = EndpointState::LOCAL_UNINIT | EndpointState::REMOTE_UNINIT;
        let session = ScriptedSession::new(self.weak(), state);
        lock(&self.sessions).push(session.clone());
        session
    }

    fn free(&self) {
        self.freed.store(true, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------

/// Scripted byte pump. Inbound bytes are recorded (with optional
/// per-push accept caps); outbound bytes are whatever the test queues.
#[derive(Default)]
pub struct ScriptedTransport {
    bound: Mutex<Option<Arc<dyn EngineConnection>>>,
    pushed: Mutex<Vec<u8>>,
    accept_caps: Mutex<VecDeque<usize>>,
    outbound: Mutex<VecDeque<u8>>,
    head_closed: AtomicBool,
    tail_closed: AtomicBool,
    unbound: AtomicBool,
    freed: AtomicBool,
}

impl ScriptedTransport {
    /// Queue outbound bytes for the adapter to drain into its sink.
    pub fn queue_output(&self, bytes: &[u8]) {
        lock(&self.outbound).extend(bytes.iter().copied());
    }

    /// All inbound bytes accepted so far, in order.
    pub fn pushed_bytes(&self) -> Vec<u8> {
        lock(&self.pushed).clone()
    }

    /// Limit how many bytes each of the next pushes accepts. Once the
    /// script runs out, pushes accept everything again.
    pub fn script_accept_caps(&self, caps: impl IntoIterator<Item = usize>) {
        lock(&self.accept_caps).extend(caps);
    }

    /// Outbound bytes not yet drained by the adapter.
    pub fn outbound_len(&self) -> usize {
        lock(&self.outbound).len()
    }

    /// True while bound to a connection.
    pub fn is_bound(&self) -> bool {
        lock(&self.bound).is_some()
    }

    /// True once `unbind` was called.
    pub fn was_unbound(&self) -> bool {
        self.unbound.load(Ordering::SeqCst)
    }

    /// True once `free` was called.
    pub fn was_freed(&self) -> bool {
        self.freed.load(Ordering::SeqCst)
    }

    /// True once the outbound direction was closed.
    pub fn is_head_closed(&self) -> bool {
        self.head_closed.load(Ordering::SeqCst)
    }

    /// True once the inbound direction was closed.
    pub fn is_tail_closed(&self) -> bool {
        self.tail_closed.load(Ordering::SeqCst)
    }
}

impl EngineTransport for ScriptedTransport {
    fn bind(&self, connection: &Arc<dyn EngineConnection>) {
        *lock(&self.bound) = Some(connection.clone());
    }

    fn unbind(&self) {
        self.unbound.store(true, Ordering::SeqCst);
        *lock(&self.bound) = None;
    }

    fn push(&self, bytes: &[u8]) -> usize {
        if self.tail_closed.load(Ordering::SeqCst) {
            return 0;
        }
        let cap = lock(&self.accept_caps).pop_front().unwrap_or(usize::MAX);
        let take = bytes.len().min(cap);
        lock(&self.pushed).extend_from_slice(&bytes[..take]);
        take
    }

    fn peek(&self, max: usize) -> TransportOutput {
        let outbound = lock(&self.outbound);
        if outbound.is_empty() {
            if self.head_closed.load(Ordering::SeqCst) {
                TransportOutput::End
            } else {
                TransportOutput::Pending
            }
        } else {
            TransportOutput::Bytes(outbound.iter().take(max).copied().collect())
        }
    }

    fn pop(&self, count: usize) {
        let mut outbound = lock(&self.outbound);
        let take = count.min(outbound.len());
        outbound.drain(..take);
    }

    fn close_head(&self) {
        self.head_closed.store(true, Ordering::SeqCst);
    }

    fn close_tail(&self) {
        self.tail_closed.store(true, Ordering::SeqCst);
    }

    fn free(&self) {
        self.freed.store(true, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------
// Engine
// ----------------------------------------------------------------------

#[derive(Default)]
struct EngineCore {
    connections: Mutex<Vec<Arc<ScriptedConnection>>>,
    transports: Mutex<Vec<Arc<ScriptedTransport>>>,
    collectors: Mutex<Vec<Arc<ScriptedCollector>>>,
}

/// The scripted engine: a factory that records everything it creates so
/// tests can reach the concrete objects behind the adapter's handles.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    core: Arc<EngineCore>,
}

impl ScriptedEngine {
    /// Fresh engine with nothing created yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections created so far, in creation order.
    pub fn connections(&self) -> Vec<Arc<ScriptedConnection>> {
        lock(&self.core.connections).clone()
    }

    /// Most recently created connection.
    pub fn last_connection(&self) -> Option<Arc<ScriptedConnection>> {
        lock(&self.core.connections).last().cloned()
    }

    /// Transports created so far, in creation order.
    pub fn transports(&self) -> Vec<Arc<ScriptedTransport>> {
        lock(&self.core.transports).clone()
    }

    /// Most recently created transport.
    pub fn last_transport(&self) -> Option<Arc<ScriptedTransport>> {
        lock(&self.core.transports).last().cloned()
    }
}

impl ProtocolEngine for ScriptedEngine {
    fn connection(&self) -> Arc<dyn EngineConnection> {
        let conn = ScriptedConnection::new(self.core.clone());
        lock(&self.core.connections).push(conn.clone());
        conn
    }

    fn transport(&self) -> Arc<dyn EngineTransport> {
        let transport = Arc::new(ScriptedTransport::default());
        lock(&self.core.transports).push(transport.clone());
        transport
    }

    fn collector(&self) -> Arc<dyn EventCollector> {
        let collector = Arc::new(ScriptedCollector::default());
        lock(&self.core.collectors).push(collector.clone());
        collector
    }

    fn message(&self) -> Box<dyn MessageCodec> {
        Box::new(ScriptedMessage::default())
    }
}
