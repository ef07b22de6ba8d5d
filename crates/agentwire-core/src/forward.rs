//! Forward messages: the instruction a mediator follows after peeling its layer.
//!
//! Wire form:
//!
//! ```json
//! { "@type": "https://didcomm.org/routing/1.0/forward", "@id": "...", "to": "<key>", "msg": { ...envelope... } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::EnvelopeError;
use crate::message::to_current_prefix;
use crate::types::WireMessage;

pub const FORWARD_MESSAGE_TYPE: &str = "https://didcomm.org/routing/1.0/forward";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForwardMessage {
    #[serde(rename = "@type")]
    pub message_type: String,
    #[serde(rename = "@id")]
    pub id: String,
    /// Key the relay delivers the embedded message to
    pub to: String,
    /// Still-encrypted inner envelope
    #[serde(rename = "msg")]
    pub message: WireMessage,
}

impl ForwardMessage {
    pub fn new(to: impl Into<String>, message: WireMessage) -> Self {
        Self {
            message_type: FORWARD_MESSAGE_TYPE.to_string(),
            id: Uuid::new_v4().to_string(),
            to: to.into(),
            message,
        }
    }

    /// Whether `type_uri` names a forward message in either prefix convention.
    pub fn is_forward_type(type_uri: &str) -> bool {
        to_current_prefix(type_uri) == FORWARD_MESSAGE_TYPE
    }

    /// Parse a decrypted forward message, rejecting anything a relay cannot act on.
    pub fn from_json(value: Value) -> Result<Self, EnvelopeError> {
        let forward: ForwardMessage = serde_json::from_value(value)
            .map_err(|e| EnvelopeError::MalformedMessage(format!("forward message: {}", e)))?;

        if !Self::is_forward_type(&forward.message_type) {
            return Err(EnvelopeError::MalformedMessage(format!(
                "expected forward message, got {}",
                forward.message_type
            )));
        }
        if forward.to.trim().is_empty() {
            return Err(EnvelopeError::MalformedMessage(
                "forward message has empty to".into(),
            ));
        }
        if !forward.message.as_json().is_object() {
            return Err(EnvelopeError::MalformedMessage(
                "forward message msg must be an envelope object".into(),
            ));
        }
        Ok(forward)
    }
}
