//! Transport serialization of agent messages.
//!
//! Any `Serialize` type is an agent message. Its transport form is a JSON
//! object; when the legacy prefix flag is set, the top-level `@type` is
//! rendered with the legacy `did:sov` prefix instead of `https://didcomm.org/`.

use serde::Serialize;
use serde_json::Value;

use crate::errors::EnvelopeError;

/// Current message type prefix.
pub const DIDCOMM_PREFIX: &str = "https://didcomm.org/";

/// Older message type prefix, still understood by some agents.
pub const LEGACY_DID_SOV_PREFIX: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/";

/// Field carrying the message type URI.
pub const TYPE_FIELD: &str = "@type";

/// A message that can be turned into its canonical keyed structure.
pub trait AgentMessage: Send + Sync {
    fn to_json(&self) -> Result<Value, EnvelopeError>;
}

impl<T> AgentMessage for T
where
    T: Serialize + Send + Sync,
{
    fn to_json(&self) -> Result<Value, EnvelopeError> {
        serde_json::to_value(self).map_err(|e| EnvelopeError::Serialization(e.to_string()))
    }
}

/// Serialize `message` to its transport form.
pub fn to_transport_json<M>(message: &M, use_legacy_did_sov_prefix: bool) -> Result<Value, EnvelopeError>
where
    M: AgentMessage + ?Sized,
{
    let mut json = message.to_json()?;
    let fields = json.as_object_mut().ok_or_else(|| {
        EnvelopeError::Serialization("agent message must serialize to a JSON object".into())
    })?;

    if use_legacy_did_sov_prefix {
        if let Some(Value::String(type_uri)) = fields.get_mut(TYPE_FIELD) {
            *type_uri = to_legacy_prefix(type_uri);
        }
    }
    Ok(json)
}

/// Serialize `message` to transport bytes.
pub fn encode_message<M>(message: &M, use_legacy_did_sov_prefix: bool) -> Result<Vec<u8>, EnvelopeError>
where
    M: AgentMessage + ?Sized,
{
    let json = to_transport_json(message, use_legacy_did_sov_prefix)?;
    serde_json::to_vec(&json).map_err(|e| EnvelopeError::Serialization(e.to_string()))
}

/// Rewrite a current-prefix type URI to the legacy prefix. Other URIs are unchanged.
pub fn to_legacy_prefix(type_uri: &str) -> String {
    match type_uri.strip_prefix(DIDCOMM_PREFIX) {
        Some(rest) => format!("{LEGACY_DID_SOV_PREFIX}{rest}"),
        None => type_uri.to_string(),
    }
}

/// Rewrite a legacy-prefix type URI to the current prefix. Other URIs are unchanged.
pub fn to_current_prefix(type_uri: &str) -> String {
    match type_uri.strip_prefix(LEGACY_DID_SOV_PREFIX) {
        Some(rest) => format!("{DIDCOMM_PREFIX}{rest}"),
        None => type_uri.to_string(),
    }
}

/// Parsed `<prefix><protocol>/<version>/<name>` message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageType {
    pub protocol: String,
    pub version: String,
    pub name: String,
}

impl MessageType {
    /// Parse a type URI in either prefix convention.
    pub fn parse(type_uri: &str) -> Option<Self> {
        let rest = type_uri
            .strip_prefix(DIDCOMM_PREFIX)
            .or_else(|| type_uri.strip_prefix(LEGACY_DID_SOV_PREFIX))?;

        let mut parts = rest.split('/');
        let protocol = parts.next().filter(|s| !s.is_empty())?;
        let version = parts.next().filter(|s| !s.is_empty())?;
        let name = parts.next().filter(|s| !s.is_empty())?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            protocol: protocol.to_string(),
            version: version.to_string(),
            name: name.to_string(),
        })
    }

    /// Type URI with the current prefix.
    pub fn uri(&self) -> String {
        format!("{}{}/{}/{}", DIDCOMM_PREFIX, self.protocol, self.version, self.name)
    }

    /// Type URI with the legacy prefix.
    pub fn legacy_uri(&self) -> String {
        format!("{}{}/{}/{}", LEGACY_DID_SOV_PREFIX, self.protocol, self.version, self.name)
    }
}
