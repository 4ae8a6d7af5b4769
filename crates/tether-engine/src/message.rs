//! Message codec boundary
//!
//! The engine owns message encoding; the adapter only moves values in and
//! out through a fixed, enumerated field set. This replaces runtime field
//! discovery with a contract that is statically checkable on both sides.

use serde::{Deserialize, Serialize};

/// Enumerated message fields the adapter marshals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageField {
    /// Application payload.
    Body,
    /// Destination address.
    To,
    /// Message subject.
    Subject,
    /// Reply address.
    ReplyTo,
    /// Correlation identifier.
    CorrelationId,
    /// MIME content type of the body.
    ContentType,
    /// Durability flag carried in the header.
    Durable,
    /// Time to live, in milliseconds.
    Ttl,
    /// Relative priority.
    Priority,
}

/// Typed value for a message field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Boolean flag.
    Bool(bool),
    /// Unsigned integer (ttl, priority).
    UInt(u64),
}

impl FieldValue {
    /// Borrow as text, if this value is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a boolean, if this value is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as an unsigned integer, if this value is one.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            FieldValue::UInt(v) => Some(*v),
            _ => None,
        }
    }
}

/// An engine-side message under construction or decode.
///
/// Constructed empty via [`crate::ProtocolEngine::message`]; release is
/// drop-based.
pub trait MessageCodec: Send {
    /// Set a field. Setting a field twice replaces the earlier value.
    fn set_field(&mut self, field: MessageField, value: FieldValue);

    /// Read a field back, if present.
    fn field(&self, field: MessageField) -> Option<FieldValue>;
}
