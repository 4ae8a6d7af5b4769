//! Protocol event collector boundary
//!
//! The engine enqueues an event into its collector for every state change
//! it observes. The adapter drains the collector in FIFO order and
//! translates each event by its kind tag; kinds it does not care about
//! are ignored.

use crate::traits::{EngineConnection, EngineDelivery, EngineLink, EngineSession};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Kind tag of a protocol event.
///
/// This is the full set a conforming engine may emit. The adapter maps a
/// subset (see the connection process loop); the rest are drained and
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Peer opened the connection.
    ConnectionRemoteOpen,
    /// Peer closed the connection.
    ConnectionRemoteClose,
    /// Peer opened a session.
    SessionRemoteOpen,
    /// Peer closed a session.
    SessionRemoteClose,
    /// Peer attached a link.
    LinkRemoteOpen,
    /// Peer detached a link.
    LinkRemoteClose,
    /// Credit or delivery-count movement on a link.
    LinkFlow,
    /// Delivery created or updated.
    Delivery,
    /// Transport has pending work.
    Transport,
    /// Transport fully closed in both directions.
    TransportClosed,
}

/// A single protocol event with accessors for the endpoint objects it
/// refers to. Accessors return `None` when the event kind does not carry
/// that object.
pub trait EngineEvent: Send + Sync {
    /// Kind tag used for translation.
    fn kind(&self) -> EventKind;

    /// Connection the event belongs to.
    fn connection(&self) -> Option<Arc<dyn EngineConnection>>;

    /// Session the event refers to, for session-scoped kinds.
    fn session(&self) -> Option<Arc<dyn EngineSession>>;

    /// Link the event refers to, for link-scoped kinds.
    fn link(&self) -> Option<Arc<dyn EngineLink>>;

    /// Delivery the event refers to, for `Delivery` events.
    fn delivery(&self) -> Option<Arc<dyn EngineDelivery>>;
}

/// Ordered queue of protocol events produced by the engine.
///
/// `peek`/`pop` are split so the adapter can translate an event (and let
/// application handlers run) before consuming it.
pub trait EventCollector: Send + Sync {
    /// Next pending event, if any. Does not consume it.
    fn peek(&self) -> Option<Arc<dyn EngineEvent>>;

    /// Consume the event last returned by `peek`.
    fn pop(&self);
}
