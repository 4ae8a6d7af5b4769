//! Sender and receiver link wrappers
//!
//! Thin stateful handles over an engine link. They own link-level
//! operations (credit, flow, send, close) and carry the link-scoped
//! listener set that heads the dispatch chain. Every mutating operation
//! ends with a connection process pass so resulting frames reach the
//! wire without the caller pumping anything.

use crate::connection::Connection;
use crate::dispatch::ListenerSet;
use crate::events::{Event, EventType};
use crate::message::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tether_engine::EngineLink;

pub(crate) struct LinkInner {
    pub(crate) connection: Connection,
    pub(crate) link: Arc<dyn EngineLink>,
    pub(crate) name: String,
    /// Credit target a receiver maintains; 0 disables automatic flow.
    pub(crate) prefetch: u32,
    /// Monotonic source for generated delivery tags.
    tag_seq: AtomicU64,
    pub(crate) listeners: ListenerSet,
}

impl LinkInner {
    fn new(connection: Connection, link: Arc<dyn EngineLink>, prefetch: u32) -> Self {
        let name = link.name();
        LinkInner {
            connection,
            link,
            name,
            prefetch,
            tag_seq: AtomicU64::new(0),
            listeners: ListenerSet::new(),
        }
    }
}

/// Outbound message link.
#[derive(Clone)]
pub struct Sender {
    inner: Arc<LinkInner>,
}

impl Sender {
    pub(crate) fn new(connection: Connection, link: Arc<dyn EngineLink>) -> Self {
        Sender {
            inner: Arc::new(LinkInner::new(connection, link, 0)),
        }
    }

    /// Link name, unique within the connection.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Credit currently granted by the peer.
    pub fn credit(&self) -> u32 {
        self.inner.link.credit()
    }

    /// Deliveries queued locally, not yet on the wire.
    pub fn queued(&self) -> u32 {
        self.inner.link.queued()
    }

    /// Address of the remote target terminus, if announced.
    pub fn target_address(&self) -> Option<String> {
        self.inner.link.remote_target_address()
    }

    /// Queue a message for transmission. A delivery tag is generated
    /// when the caller does not supply one.
    pub fn send(&self, message: &Message) {
        self.send_tagged(message, None);
    }

    /// Queue a message under an explicit delivery tag.
    pub fn send_tagged(&self, message: &Message, tag: Option<&[u8]>) {
        let mut codec = self.inner.connection.engine().message();
        message.to_codec(codec.as_mut());
        let tag = match tag {
            Some(tag) => tag.to_vec(),
            None => self.next_tag(),
        };
        self.inner.link.send(codec.as_ref(), &tag);
        self.inner.connection.process();
    }

    /// Close the link.
    pub fn close(&self) {
        self.inner.link.close();
        self.inner.connection.process();
    }

    /// Detach the link without closing its terminus.
    pub fn detach(&self) {
        self.inner.link.detach();
        self.inner.connection.process();
    }

    /// Register a link-scoped event handler.
    pub fn on(&self, event: EventType, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.inner.listeners.register(event, handler);
    }

    fn next_tag(&self) -> Vec<u8> {
        let seq = self.inner.tag_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.inner.name, seq).into_bytes()
    }

    pub(crate) fn listeners(&self) -> &ListenerSet {
        &self.inner.listeners
    }
}

/// Inbound message link with automatic prefetch flow.
#[derive(Clone)]
pub struct Receiver {
    inner: Arc<LinkInner>,
}

impl Receiver {
    pub(crate) fn new(connection: Connection, link: Arc<dyn EngineLink>, prefetch: u32) -> Self {
        Receiver {
            inner: Arc::new(LinkInner::new(connection, link, prefetch)),
        }
    }

    /// Link name, unique within the connection.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Credit currently outstanding toward the peer.
    pub fn credit(&self) -> u32 {
        self.inner.link.credit()
    }

    /// Deliveries available to read.
    pub fn available(&self) -> u32 {
        self.inner.link.available()
    }

    /// Credit target this receiver maintains automatically.
    pub fn prefetch(&self) -> u32 {
        self.inner.prefetch
    }

    /// Address of the remote source terminus, if announced.
    pub fn source_address(&self) -> Option<String> {
        self.inner.link.remote_source_address()
    }

    /// Issue `credit` additional units manually.
    pub fn flow(&self, credit: u32) {
        self.inner.link.flow(credit);
        self.inner.connection.process();
    }

    /// Close the link.
    pub fn close(&self) {
        self.inner.link.close();
        self.inner.connection.process();
    }

    /// Detach the link without closing its terminus.
    pub fn detach(&self) {
        self.inner.link.detach();
        self.inner.connection.process();
    }

    /// Register a link-scoped event handler.
    pub fn on(&self, event: EventType, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.inner.listeners.register(event, handler);
    }

    /// Issue the initial prefetch window. Skipped when prefetch is 0.
    pub(crate) fn grant_prefetch(&self) {
        if self.inner.prefetch > 0 {
            self.inner.link.flow(self.inner.prefetch);
        }
    }

    /// Top credit back up to the prefetch target after a consumed
    /// message. Never issues negative credit: if current credit already
    /// meets the target, nothing happens.
    pub(crate) fn replenish(&self) {
        if self.inner.prefetch == 0 {
            return;
        }
        let current = self.inner.link.credit();
        if current < self.inner.prefetch {
            self.inner.link.flow(self.inner.prefetch - current);
        }
    }

    pub(crate) fn listeners(&self) -> &ListenerSet {
        &self.inner.listeners
    }
}

/// Registry entry: either wrapper, addressed by link name.
#[derive(Clone)]
pub(crate) enum LinkHandle {
    Sender(Sender),
    Receiver(Receiver),
}

impl LinkHandle {
    pub(crate) fn engine_link(&self) -> &Arc<dyn EngineLink> {
        match self {
            LinkHandle::Sender(s) => &s.inner.link,
            LinkHandle::Receiver(r) => &r.inner.link,
        }
    }

    pub(crate) fn listeners(&self) -> &ListenerSet {
        match self {
            LinkHandle::Sender(s) => &s.inner.listeners,
            LinkHandle::Receiver(r) => &r.inner.listeners,
        }
    }

    /// The `<role>_opening` event for this link.
    pub(crate) fn opening_event(&self) -> Event {
        match self {
            LinkHandle::Sender(s) => Event::SenderOpening(s.clone()),
            LinkHandle::Receiver(r) => Event::ReceiverOpening(r.clone()),
        }
    }

    /// The `<role>_opened` event for this link.
    pub(crate) fn opened_event(&self) -> Event {
        match self {
            LinkHandle::Sender(s) => Event::SenderOpened(s.clone()),
            LinkHandle::Receiver(r) => Event::ReceiverOpened(r.clone()),
        }
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender").field("name", &self.inner.name).finish()
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("name", &self.inner.name)
            .field("prefetch", &self.inner.prefetch)
            .finish()
    }
}
