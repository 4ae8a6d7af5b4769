//! Connection-engine adapter for AMQP 1.0 messaging
//!
//! Drives an external protocol engine (see `tether-engine`) to provide
//! durable, flow-controlled, event-addressable connections over TCP. The
//! adapter pumps bytes between sockets and the engine's transport, drains
//! the engine's event collector into a small application event
//! vocabulary, manages endpoint open/close negotiation, credit-based
//! prefetch for receivers, delivery settlement for senders, and
//! reconnect with capped exponential backoff.
//!
//! Applications register handlers at three granularities (link,
//! connection, or container) and each event reaches exactly one of
//! them, falling back outward to the container as a guaranteed backstop.

pub mod config;
pub mod connection;
pub mod container;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod link;
pub mod message;
pub mod reconnect;

mod net;

pub use config::{ConnectOptions, LinkOptions, ListenOptions, Terminus, DEFAULT_PREFETCH, DEFAULT_PORT};
pub use connection::{Connection, WireSink};
pub use container::{Container, ContainerOptions, IdSequence, Listener};
pub use dispatch::{dispatch, Listener as EventListener, ListenerSet};
pub use error::{Result, TetherError};
pub use events::{Event, EventType};
pub use link::{Receiver, Sender};
pub use message::{Body, Message};
pub use reconnect::ReconnectConfig;
