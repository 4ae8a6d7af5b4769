//! Engine binding boundary
//!
//! The tether adapter does not parse or encode the AMQP 1.0 wire format.
//! It drives an external protocol engine that owns the state machine,
//! frame codec, and SASL negotiation, and exposes it as an opaque object
//! model. This crate is that boundary: object-safe traits for the engine
//! objects (connection, session, link, delivery, transport, event
//! collector, message codec) plus the shared value types the adapter and
//! engine exchange.
//!
//! Engine objects are reference-counted handles with interior mutability
//! on the engine side; every trait method takes `&self`. Resource release
//! that the original engine exposed as explicit `free()` calls is kept
//! explicit here for the connection and transport (the adapter controls
//! when those are reclaimed); everything else releases on drop.

pub mod events;
pub mod message;
pub mod state;
pub mod traits;

pub use events::*;
pub use message::*;
pub use state::*;
pub use traits::*;
