//! Error types for agentwire core.
//!
//! Crypto failures are never recovered or retried here. They are wrapped once
//! so the caller learns which layer and which public key were involved.

use std::fmt;

use agentwire_crypto::CryptoError;
use thiserror::Error;

/// Position in the envelope pipeline where an operation ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Innermost encryption for the final recipients
    Inner,
    /// Forward wrapping for routing key `hop` (0 = first routing key)
    Forward { hop: usize },
    /// One decryption step on receipt
    Unpack,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Inner => write!(f, "inner layer"),
            Layer::Forward { hop } => write!(f, "forward hop {}", hop),
            Layer::Unpack => write!(f, "unpack"),
        }
    }
}

/// Unified error type for envelope operations.
#[derive(Debug, Error, Clone)]
pub enum EnvelopeError {
    /// The crypto capability failed (bad key, corrupt ciphertext, timeout, backend fault)
    #[error("crypto operation failed at {layer} (key {}): {source}", .key.as_deref().unwrap_or("unknown"))]
    CryptoOperation {
        layer: Layer,
        /// Public key identifier(s) involved, never secret material
        key: Option<String>,
        #[source]
        source: CryptoError,
    },

    /// Feature deliberately not implemented by this layer
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Missing or invalid envelope keys
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Message could not be serialized to its transport form
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Decrypted or received content is not a valid message
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl EnvelopeError {
    /// Layer of a crypto failure, if this is one.
    pub fn layer(&self) -> Option<Layer> {
        match self {
            EnvelopeError::CryptoOperation { layer, .. } => Some(*layer),
            _ => None,
        }
    }

    /// Key named by a crypto failure, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            EnvelopeError::CryptoOperation { key, .. } => key.as_deref(),
            _ => None,
        }
    }

    pub fn is_crypto(&self) -> bool {
        matches!(self, EnvelopeError::CryptoOperation { .. })
    }
}
