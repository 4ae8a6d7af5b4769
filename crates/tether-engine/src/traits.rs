//! Engine object traits
//!
//! Opaque handles onto the protocol engine's endpoint objects. All
//! handles are `Arc<dyn …>` with interior mutability on the engine side,
//! so methods take `&self` and the adapter can hold clones across its
//! own lock boundaries.

use crate::events::EventCollector;
use crate::message::MessageCodec;
use crate::state::EndpointState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Terminal outcome of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    /// Delivery accepted by the peer.
    Accepted,
    /// Delivery rejected as invalid.
    Rejected,
    /// Delivery released back without processing.
    Released,
    /// Delivery released with modifications (treated like released).
    Modified,
}

/// Attach-time configuration the adapter passes when creating a link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Source address (where messages come from).
    pub source: Option<String>,
    /// Target address (where messages go).
    pub target: Option<String>,
    /// Request a durable terminus.
    pub durable: bool,
}

/// Result of asking the transport for pending output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutput {
    /// Outbound bytes ready to be written to the socket.
    Bytes(Vec<u8>),
    /// Nothing pending right now; more may appear after processing.
    Pending,
    /// The write side is closed for good. Not an error.
    End,
}

/// Factory for fresh engine objects. One engine instance can back any
/// number of adapter connections.
pub trait ProtocolEngine: Send + Sync {
    /// Create a fresh, unopened protocol connection.
    fn connection(&self) -> Arc<dyn EngineConnection>;

    /// Create a transport byte pump, not yet bound to any connection.
    fn transport(&self) -> Arc<dyn EngineTransport>;

    /// Create an empty event collector.
    fn collector(&self) -> Arc<dyn EventCollector>;

    /// Construct an empty message.
    fn message(&self) -> Box<dyn MessageCodec>;
}

/// Engine-side connection endpoint.
pub trait EngineConnection: Send + Sync {
    /// Open the local end.
    fn open(&self);

    /// Close the local end.
    fn close(&self);

    /// Current local/remote state bits.
    fn state(&self) -> EndpointState;

    /// Set the container id announced at open.
    fn set_container_id(&self, id: &str);

    /// Container id currently configured.
    fn container_id(&self) -> String;

    /// Provide SASL credentials. The engine owns mechanism negotiation.
    fn set_credentials(&self, username: &str, password: &str);

    /// Route this connection's events into `collector`.
    fn collect(&self, collector: Arc<dyn EventCollector>);

    /// Create a new session on this connection (unopened).
    fn create_session(&self) -> Arc<dyn EngineSession>;

    /// Release engine resources for this connection. The handle must not
    /// be used afterwards.
    fn free(&self);
}

/// Engine-side session endpoint.
pub trait EngineSession: Send + Sync {
    /// Open the local end.
    fn open(&self);

    /// Current local/remote state bits.
    fn state(&self) -> EndpointState;

    /// Create an unopened sender link on this session.
    fn create_sender(&self, name: &str, spec: &LinkSpec) -> Arc<dyn EngineLink>;

    /// Create an unopened receiver link on this session.
    fn create_receiver(&self, name: &str, spec: &LinkSpec) -> Arc<dyn EngineLink>;
}

/// Engine-side link endpoint (either direction).
pub trait EngineLink: Send + Sync {
    /// Link name, unique per connection.
    fn name(&self) -> String;

    /// True when the local end of this link is the sender.
    fn is_sender(&self) -> bool;

    /// Open the local end.
    fn open(&self);

    /// Close the local end.
    fn close(&self);

    /// Detach without closing the terminus.
    fn detach(&self);

    /// Current local/remote state bits.
    fn state(&self) -> EndpointState;

    /// Credit currently available on this link.
    fn credit(&self) -> u32;

    /// Deliveries queued locally, not yet on the wire.
    fn queued(&self) -> u32;

    /// Deliveries available to read (receiver side).
    fn available(&self) -> u32;

    /// Issue `credit` additional units of flow credit.
    fn flow(&self, credit: u32);

    /// Queue a message for transmission under `tag`.
    fn send(&self, message: &dyn MessageCodec, tag: &[u8]);

    /// Try to decode the current incoming delivery into `message`.
    /// Returns false while the delivery is still incomplete.
    fn recv(&self, message: &mut dyn MessageCodec) -> bool;

    /// Address of the remote source terminus, if announced.
    fn remote_source_address(&self) -> Option<String>;

    /// Address of the remote target terminus, if announced.
    fn remote_target_address(&self) -> Option<String>;
}

/// One message transfer attempt on a link.
pub trait EngineDelivery: Send + Sync {
    /// True when the peer changed this delivery's disposition since the
    /// adapter last looked.
    fn updated(&self) -> bool;

    /// True once the delivery is settled.
    fn settled(&self) -> bool;

    /// Terminal outcome reported by the peer, if any.
    fn remote_outcome(&self) -> Option<DeliveryOutcome>;

    /// Terminal outcome set locally, if any.
    fn local_outcome(&self) -> Option<DeliveryOutcome>;

    /// Set the local terminal outcome.
    fn set_local_outcome(&self, outcome: DeliveryOutcome);

    /// Settle the delivery, releasing engine resources for it.
    fn settle(&self);
}

/// The engine's byte-level pump, independent of any socket.
pub trait EngineTransport: Send + Sync {
    /// Bind this transport to a connection. At most one transport may be
    /// bound to a connection at a time.
    fn bind(&self, connection: &Arc<dyn EngineConnection>);

    /// Detach from the bound connection.
    fn unbind(&self);

    /// Offer inbound bytes. Returns how many were consumed; the engine
    /// may take fewer than offered.
    fn push(&self, bytes: &[u8]) -> usize;

    /// Look at up to `max` pending outbound bytes without consuming them.
    fn peek(&self, max: usize) -> TransportOutput;

    /// Discard `count` outbound bytes previously returned by `peek`.
    fn pop(&self, count: usize);

    /// Close the outbound (head) direction.
    fn close_head(&self);

    /// Close the inbound (tail) direction.
    fn close_tail(&self);

    /// Release engine resources for this transport.
    fn free(&self);
}
