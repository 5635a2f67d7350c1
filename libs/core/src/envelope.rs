//! Typed view of an inbound Slack Events API delivery.
//!
//! The boundary parses the raw JSON body exactly once; everything downstream
//! works with [`EventEnvelope`] and never indexes into raw maps to discover
//! what kind of delivery it is.

use serde_json::{Map, Value};
use thiserror::Error;

/// Parsed delivery: a URL verification handshake or a domain event.
///
/// ```
/// use seb_core::EventEnvelope;
///
/// let env = EventEnvelope::from_slice(br#"{"type":"url_verification","challenge":"abc"}"#).unwrap();
/// assert!(matches!(env, EventEnvelope::Handshake(ref h) if h.token == "abc"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum EventEnvelope {
    Handshake(HandshakeEnvelope),
    Event(DomainEvent),
}

/// URL verification handshake; the token is echoed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeEnvelope {
    pub token: String,
}

/// An `event_callback` delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    pub event_id: String,
    pub team_id: String,
    pub event_type: String,
    /// The inner `event` object, including its `type`.
    pub payload: Map<String, Value>,
    /// Remaining top-level fields (`api_app_id`, `event_time`, `authorizations`, ...).
    pub attributes: Map<String, Value>,
}

impl DomainEvent {
    pub fn new(
        event_id: impl Into<String>,
        team_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        let event_type = event_type.into();
        let mut payload = Map::new();
        payload.insert("type".into(), Value::String(event_type.clone()));
        Self {
            event_id: event_id.into(),
            team_id: team_id.into(),
            event_type,
            payload,
            attributes: Map::new(),
        }
    }

    pub fn with_payload_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Looks up a field of the inner `event` object.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// The event subtype (`message_changed`, `bot_message`, ...) if present.
    pub fn subtype(&self) -> Option<&str> {
        self.payload.get("subtype").and_then(Value::as_str)
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload must be a json object")]
    NotAnObject,
    #[error("event payload is missing `{0}`")]
    MissingField(&'static str),
}

impl EventEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Object(mut fields) = value else {
            return Err(EnvelopeError::NotAnObject);
        };

        if let Some(Value::String(token)) = fields.remove("challenge") {
            return Ok(Self::Handshake(HandshakeEnvelope { token }));
        }

        let event_id = take_string(&mut fields, "event_id")?;
        let team_id = take_string(&mut fields, "team_id")?;
        let payload = match fields.remove("event") {
            Some(Value::Object(payload)) => payload,
            _ => return Err(EnvelopeError::MissingField("event")),
        };
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(EnvelopeError::MissingField("event.type"))?;

        Ok(Self::Event(DomainEvent {
            event_id,
            team_id,
            event_type,
            payload,
            attributes: fields,
        }))
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &'static str) -> Result<String, EnvelopeError> {
    match fields.remove(key) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value),
        _ => Err(EnvelopeError::MissingField(key)),
    }
}
