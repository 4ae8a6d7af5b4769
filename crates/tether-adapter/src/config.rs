//! Connection and link options
//!
//! Plain option structs filled in by the application. Hosts may be given
//! as a comma-separated failover list; reconnect attempts rotate through
//! them in order.

use crate::reconnect::ReconnectConfig;
use serde::{Deserialize, Serialize};

/// Default AMQP port.
pub const DEFAULT_PORT: u16 = 5672;

/// Default receiver prefetch window.
pub const DEFAULT_PREFETCH: u32 = 500;

/// Options for [`crate::Container::connect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Host to connect to. A comma-separated list enables failover: the
    /// first entry is tried first, and reconnect attempts rotate through
    /// the rest.
    pub host: String,
    /// TCP port, shared by all hosts in the list.
    pub port: u16,
    /// SASL username, handed to the engine.
    pub username: Option<String>,
    /// SASL password, handed to the engine.
    pub password: Option<String>,
    /// Override the container id announced on this connection.
    pub container_id: Option<String>,
    /// Re-establish the transport after socket failure.
    pub reconnect: bool,
    /// Backoff policy used when `reconnect` is set.
    pub reconnect_config: ReconnectConfig,
}

impl ConnectOptions {
    /// Options for a single host with defaults everywhere else.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            container_id: None,
            reconnect: false,
            reconnect_config: ReconnectConfig::default(),
        }
    }

    /// The failover host list parsed out of `host`.
    pub fn hosts(&self) -> Vec<String> {
        self.host
            .split(',')
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect()
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

/// Options for [`crate::Container::listen`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenOptions {
    /// Interface to bind.
    pub host: String,
    /// Port to bind. 0 picks an ephemeral port.
    pub port: u16,
}

impl ListenOptions {
    /// Listen on the given port on all interfaces.
    pub fn port(port: u16) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
        }
    }
}

/// A link terminus: for now just an address, matching what the engine
/// understands. Accepts plain strings wherever a terminus is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminus {
    /// Node address of this terminus.
    pub address: String,
}

impl Terminus {
    /// The terminus address.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl From<&str> for Terminus {
    fn from(address: &str) -> Self {
        Terminus {
            address: address.to_string(),
        }
    }
}

impl From<String> for Terminus {
    fn from(address: String) -> Self {
        Terminus { address }
    }
}

/// Options for creating a sender or receiver link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkOptions {
    /// Explicit link name. Generated from the container id and the
    /// source/target addresses when absent. Either way the name is
    /// disambiguated against the connection's registry.
    pub name: Option<String>,
    /// Source terminus (messages come from here).
    pub source: Option<Terminus>,
    /// Target terminus (messages go here).
    pub target: Option<Terminus>,
    /// Request durable termini.
    pub durable: bool,
    /// Receiver prefetch window. `None` uses [`DEFAULT_PREFETCH`];
    /// `Some(0)` disables automatic flow entirely.
    pub prefetch: Option<u32>,
}

impl LinkOptions {
    /// Options targeting the given address (sender side).
    pub fn target(address: impl Into<Terminus>) -> Self {
        LinkOptions {
            target: Some(address.into()),
            ..LinkOptions::default()
        }
    }

    /// Options sourcing from the given address (receiver side).
    pub fn source(address: impl Into<Terminus>) -> Self {
        LinkOptions {
            source: Some(address.into()),
            ..LinkOptions::default()
        }
    }

    /// Set an explicit link name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the receiver prefetch window.
    pub fn with_prefetch(mut self, prefetch: u32) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    /// Request durable termini.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Effective prefetch for a receiver created with these options.
    pub fn effective_prefetch(&self) -> u32 {
        self.prefetch.unwrap_or(DEFAULT_PREFETCH)
    }
}
