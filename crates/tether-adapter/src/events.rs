//! Application-visible events
//!
//! The connection process loop translates raw protocol events into this
//! small lifecycle/application vocabulary and dispatches each through the
//! fallback chain (link → connection → container).

use crate::connection::Connection;
use crate::link::{Receiver, Sender};
use crate::message::Message;

/// Event name, used for listener registration and dispatch lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Peer opened a connection we had not opened yet.
    ConnectionOpening,
    /// Connection open negotiation completed.
    ConnectionOpened,
    /// Peer closed a connection that is still locally open.
    ConnectionClosing,
    /// Connection close negotiation completed.
    ConnectionClosed,
    /// Transport failed or the peer hung up before close completed.
    Disconnected,
    /// Peer opened a sender link we had not opened yet.
    SenderOpening,
    /// Sender link open negotiation completed.
    SenderOpened,
    /// Peer opened a receiver link we had not opened yet.
    ReceiverOpening,
    /// Receiver link open negotiation completed.
    ReceiverOpened,
    /// A sender link has positive credit; messages may be sent.
    Sendable,
    /// A complete message arrived on a receiver link.
    Message,
    /// The peer accepted an outbound delivery.
    Accepted,
    /// The peer released (or modified) an outbound delivery.
    Released,
    /// The peer rejected an outbound delivery.
    Rejected,
    /// An outbound delivery was settled.
    Settled,
}

/// An event plus its payload handles. Handlers receive a reference and
/// may call back into the handles (send, flow, close, …); the process
/// loop is guarded against the re-entry that causes.
#[derive(Clone)]
pub enum Event {
    /// Peer opened a connection we had not opened yet.
    ConnectionOpening(Connection),
    /// Connection open negotiation completed.
    ConnectionOpened(Connection),
    /// Peer closed a connection that is still locally open.
    ConnectionClosing(Connection),
    /// Connection close negotiation completed.
    ConnectionClosed(Connection),
    /// Transport failed; `error` carries the socket error, if any.
    Disconnected {
        /// The affected connection.
        connection: Connection,
        /// Socket error text, when the disconnect was not a clean EOF.
        error: Option<String>,
    },
    /// Peer opened a sender link we had not opened yet.
    SenderOpening(Sender),
    /// Sender link open negotiation completed.
    SenderOpened(Sender),
    /// Peer opened a receiver link we had not opened yet.
    ReceiverOpening(Receiver),
    /// Receiver link open negotiation completed.
    ReceiverOpened(Receiver),
    /// The sender has positive credit.
    Sendable(Sender),
    /// A complete message arrived.
    Message {
        /// Receiver the message arrived on.
        receiver: Receiver,
        /// The decoded application message.
        message: Message,
    },
    /// The peer accepted an outbound delivery.
    Accepted(Sender),
    /// The peer released or modified an outbound delivery.
    Released(Sender),
    /// The peer rejected an outbound delivery.
    Rejected(Sender),
    /// An outbound delivery was settled.
    Settled(Sender),
}

impl Event {
    /// The event's name tag.
    pub fn event_type(&self) -> EventType {
        match self {
            Event::ConnectionOpening(_) => EventType::ConnectionOpening,
            Event::ConnectionOpened(_) => EventType::ConnectionOpened,
            Event::ConnectionClosing(_) => EventType::ConnectionClosing,
            Event::ConnectionClosed(_) => EventType::ConnectionClosed,
            Event::Disconnected { .. } => EventType::Disconnected,
            Event::SenderOpening(_) => EventType::SenderOpening,
            Event::SenderOpened(_) => EventType::SenderOpened,
            Event::ReceiverOpening(_) => EventType::ReceiverOpening,
            Event::ReceiverOpened(_) => EventType::ReceiverOpened,
            Event::Sendable(_) => EventType::Sendable,
            Event::Message { .. } => EventType::Message,
            Event::Accepted(_) => EventType::Accepted,
            Event::Released(_) => EventType::Released,
            Event::Rejected(_) => EventType::Rejected,
            Event::Settled(_) => EventType::Settled,
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.event_type())
    }
}
