//! JSON envelope structure shared by Authcrypt and Anoncrypt.
//!
//! ```text
//! { "protected": b64(ProtectedHeader), "iv": b64, "ciphertext": b64, "tag": b64 }
//! ```
//!
//! All binary fields use base64url without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// Content encryption identifier carried in the protected header.
pub const ENC_XCHACHA20POLY1305: &str = "xchacha20poly1305_ietf";

/// Envelope type identifier carried in the protected header.
pub const TYP_JWM: &str = "JWM/1.0";

/// A sealed envelope as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwe {
    pub protected: String,
    pub iv: String,
    pub ciphertext: String,
    pub tag: String,
}

/// Content-key wrapping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackAlg {
    Authcrypt,
    Anoncrypt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub enc: String,
    pub typ: String,
    pub alg: PackAlg,
    pub recipients: Vec<Recipient>,
}

/// One wrapped copy of the content key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub encrypted_key: String,
    pub header: RecipientHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientHeader {
    pub kid: String,
    /// Sealed sender verkey (Authcrypt only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Key-wrap nonce (Authcrypt only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
}

impl Jwe {
    /// Decode the base64url protected header.
    pub fn protected_header(&self) -> Result<ProtectedHeader, CryptoError> {
        let raw = b64_decode(&self.protected, "protected")?;
        serde_json::from_slice(&raw)
            .map_err(|e| CryptoError::Malformed(format!("protected header: {e}")))
    }

    /// Key identifiers this envelope is addressed to, in header order.
    pub fn recipient_kids(&self) -> Result<Vec<String>, CryptoError> {
        Ok(self
            .protected_header()?
            .recipients
            .into_iter()
            .map(|r| r.header.kid)
            .collect())
    }

    pub fn to_json(&self) -> Result<serde_json::Value, CryptoError> {
        serde_json::to_value(self).map_err(|e| CryptoError::Backend(e.to_string()))
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, CryptoError> {
        serde_json::from_value(value).map_err(|e| CryptoError::Malformed(e.to_string()))
    }
}

pub(crate) fn b64_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn b64_decode(encoded: &str, field: &'static str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| CryptoError::Malformed(format!("{field}: {e}")))
}
