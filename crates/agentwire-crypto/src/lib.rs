//! agentwire-crypto - the default pack/unpack capability for agentwire.
//!
//! Provides:
//! - X25519 key pairs addressed by base58 key identifiers ("verkeys")
//! - JWE-style envelopes with authenticated (Authcrypt) and anonymous
//!   (Anoncrypt) content-key wrapping
//! - An in-memory wallet that selects the matching local key on unpack

#![forbid(unsafe_code)]

pub mod error;
pub mod keys;
pub mod jwe;
pub mod envelope;
pub mod wallet;

pub use error::CryptoError;
pub use keys::KeyPair;
pub use jwe::Jwe;
pub use envelope::Opened;
pub use wallet::Wallet;

#[cfg(test)]
mod proptests;
