//! Error type for the envelope capability.

use thiserror::Error;

/// Failures surfaced by key handling, sealing and opening.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// None of the addressed keys is held locally
    #[error("no local key for any of: {0}")]
    KeyNotFound(String),

    /// Key identifier or secret could not be decoded
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Envelope structure could not be parsed
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// AEAD authentication failed
    #[error("decryption failed")]
    DecryptFailed,

    /// AEAD sealing or randomness failed
    #[error("encryption failed")]
    EncryptFailed,

    /// Envelope must address at least one recipient
    #[error("envelope has no recipients")]
    NoRecipients,

    /// Any other backend fault
    #[error("crypto backend error: {0}")]
    Backend(String),
}
