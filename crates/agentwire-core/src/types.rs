use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EnvelopeError;
use crate::forward::ForwardMessage;
use crate::message::{MessageType, TYPE_FIELD};

/// Keys for one outbound message. Built per send and consumed by the packer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvelopeKeys {
    /// Parties able to read the payload; must not be empty
    pub recipient_keys: Vec<String>,
    /// Mediators in hop order; index 0 wraps first, the last index is outermost
    pub routing_keys: Vec<String>,
    /// Authenticates the innermost layer when present
    pub sender_key: Option<String>,
}

impl EnvelopeKeys {
    pub fn new<I, S>(recipient_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recipient_keys: recipient_keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_routing_keys<I, S>(mut self, routing_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routing_keys = routing_keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sender_key(mut self, sender_key: impl Into<String>) -> Self {
        self.sender_key = Some(sender_key.into());
        self
    }

    /// Reject key sets that cannot produce a deliverable envelope.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.recipient_keys.is_empty() {
            return Err(EnvelopeError::Configuration(
                "recipient_keys must not be empty".into(),
            ));
        }
        if let Some(i) = self.recipient_keys.iter().position(|k| k.trim().is_empty()) {
            return Err(EnvelopeError::Configuration(format!(
                "recipient_keys[{}] is empty",
                i
            )));
        }
        if let Some(i) = self.routing_keys.iter().position(|k| k.trim().is_empty()) {
            return Err(EnvelopeError::Configuration(format!(
                "routing_keys[{}] is empty",
                i
            )));
        }
        if matches!(self.sender_key.as_deref(), Some(k) if k.trim().is_empty()) {
            return Err(EnvelopeError::Configuration("sender_key is empty".into()));
        }
        Ok(())
    }
}

/// An encrypted envelope as produced by the crypto capability.
///
/// Opaque to this crate: it is carried, nested and transmitted, never inspected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireMessage(Value);

impl WireMessage {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn into_json(self) -> Value {
        self.0
    }

    /// Bytes handed to the transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(&self.0).map_err(|e| EnvelopeError::Serialization(e.to_string()))
    }

    /// Parse bytes received from the transport. Envelopes are always JSON objects.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| EnvelopeError::MalformedMessage(format!("wire message: {}", e)))?;
        if !value.is_object() {
            return Err(EnvelopeError::MalformedMessage(
                "wire message must be a JSON object".into(),
            ));
        }
        Ok(Self(value))
    }
}

/// Result of one decryption step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnpackedMessageContext {
    /// Decrypted payload; may itself be a forward message
    pub message: Value,
    /// Present only when the sender authenticated
    pub sender_key: Option<String>,
    /// Local key that opened the envelope
    pub recipient_key: String,
}

impl UnpackedMessageContext {
    /// Raw `@type` of the decrypted message, if any.
    pub fn type_uri(&self) -> Option<&str> {
        self.message.get(TYPE_FIELD).and_then(Value::as_str)
    }

    /// Parsed `@type`, accepting both prefix conventions.
    pub fn message_type(&self) -> Option<MessageType> {
        self.type_uri().and_then(MessageType::parse)
    }

    /// Whether another unwrap step is needed before delivery.
    pub fn is_forward(&self) -> bool {
        self.type_uri().map_or(false, ForwardMessage::is_forward_type)
    }

    pub fn into_forward(self) -> Result<ForwardMessage, EnvelopeError> {
        ForwardMessage::from_json(self.message)
    }
}
