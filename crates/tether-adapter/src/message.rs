//! Application message schema
//!
//! An explicit, enumerated field set marshalled one-to-one through the
//! engine codec's typed accessors. Absent fields are simply not copied in
//! either direction.

use serde::{Deserialize, Serialize};
use tether_engine::{FieldValue, MessageCodec, MessageField};

/// Message body payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    /// UTF-8 text body.
    Text(String),
    /// Opaque binary body.
    Data(Vec<u8>),
}

/// An application message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Payload.
    pub body: Option<Body>,
    /// Destination address.
    pub to: Option<String>,
    /// Subject.
    pub subject: Option<String>,
    /// Reply address.
    pub reply_to: Option<String>,
    /// Correlation identifier.
    pub correlation_id: Option<String>,
    /// MIME content type of the body.
    pub content_type: Option<String>,
    /// Durable header flag.
    pub durable: bool,
    /// Time to live in milliseconds.
    pub ttl: Option<u64>,
    /// Relative priority.
    pub priority: Option<u8>,
}

impl Message {
    /// A message with a text body and nothing else.
    pub fn text(body: impl Into<String>) -> Self {
        Message {
            body: Some(Body::Text(body.into())),
            ..Message::default()
        }
    }

    /// Copy every present field into an engine message.
    pub fn to_codec(&self, codec: &mut dyn MessageCodec) {
        match &self.body {
            Some(Body::Text(text)) => {
                codec.set_field(MessageField::Body, FieldValue::Text(text.clone()));
            }
            Some(Body::Data(data)) => {
                codec.set_field(MessageField::Body, FieldValue::Bytes(data.clone()));
            }
            None => {}
        }
        if let Some(to) = &self.to {
            codec.set_field(MessageField::To, FieldValue::Text(to.clone()));
        }
        if let Some(subject) = &self.subject {
            codec.set_field(MessageField::Subject, FieldValue::Text(subject.clone()));
        }
        if let Some(reply_to) = &self.reply_to {
            codec.set_field(MessageField::ReplyTo, FieldValue::Text(reply_to.clone()));
        }
        if let Some(id) = &self.correlation_id {
            codec.set_field(MessageField::CorrelationId, FieldValue::Text(id.clone()));
        }
        if let Some(ct) = &self.content_type {
            codec.set_field(MessageField::ContentType, FieldValue::Text(ct.clone()));
        }
        if self.durable {
            codec.set_field(MessageField::Durable, FieldValue::Bool(true));
        }
        if let Some(ttl) = self.ttl {
            codec.set_field(MessageField::Ttl, FieldValue::UInt(ttl));
        }
        if let Some(priority) = self.priority {
            codec.set_field(MessageField::Priority, FieldValue::UInt(u64::from(priority)));
        }
    }

    /// Build a message from whatever fields the engine decoded.
    pub fn from_codec(codec: &dyn MessageCodec) -> Self {
        let body = match codec.field(MessageField::Body) {
            Some(FieldValue::Text(text)) => Some(Body::Text(text)),
            Some(FieldValue::Bytes(data)) => Some(Body::Data(data)),
            _ => None,
        };
        let text = |field: MessageField| match codec.field(field) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        };
        Message {
            body,
            to: text(MessageField::To),
            subject: text(MessageField::Subject),
            reply_to: text(MessageField::ReplyTo),
            correlation_id: text(MessageField::CorrelationId),
            content_type: text(MessageField::ContentType),
            durable: codec
                .field(MessageField::Durable)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            ttl: codec.field(MessageField::Ttl).and_then(|v| v.as_uint()),
            priority: codec
                .field(MessageField::Priority)
                .and_then(|v| v.as_uint())
                .map(|p| p.min(u64::from(u8::MAX)) as u8),
        }
    }

    /// Borrow the body as text, if it is text.
    pub fn body_text(&self) -> Option<&str> {
        match &self.body {
            Some(Body::Text(text)) => Some(text),
            _ => None,
        }
    }
}
