//! Key pairs for envelope sealing.
//!
//! Every key is an X25519 key pair. Peers address each other by the base58
//! encoding of the 32-byte public key, the "verkey".

use rand_core::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Length of public and secret key material in bytes.
pub const KEY_LEN: usize = 32;

/// An X25519 key pair. The secret half zeroizes on drop.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair using a secure random source.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a key pair from raw secret bytes.
    pub fn from_secret_bytes(bytes: &[u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a key pair from a base58 encoded secret, as written to key files.
    pub fn from_base58_secret(encoded: &str) -> Result<Self, CryptoError> {
        let raw = Zeroizing::new(
            bs58::decode(encoded.trim())
                .into_vec()
                .map_err(|e| CryptoError::InvalidKey(format!("secret is not base58: {e}")))?,
        );
        let bytes: [u8; KEY_LEN] = raw.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "secret must be {KEY_LEN} bytes, got {}",
                raw.len()
            ))
        })?;
        let pair = Self::from_secret_bytes(&bytes);
        Ok(pair)
    }

    /// Base58 key identifier of the public half.
    pub fn verkey(&self) -> String {
        encode_verkey(self.public.as_bytes())
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Base58 encoding of the secret half.
    pub fn secret_base58(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.secret.to_bytes());
        Zeroizing::new(bs58::encode(&bytes[..]).into_string())
    }

    /// X25519 Diffie-Hellman with a peer public key.
    pub fn diffie_hellman(&self, peer: &PublicKey) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(self.secret.diffie_hellman(peer).to_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("verkey", &self.verkey())
            .finish_non_exhaustive()
    }
}

/// Encode raw public key bytes as a verkey.
pub fn encode_verkey(public: &[u8; KEY_LEN]) -> String {
    bs58::encode(public).into_string()
}

/// Decode a verkey back into an X25519 public key.
pub fn decode_verkey(verkey: &str) -> Result<PublicKey, CryptoError> {
    let raw = bs58::decode(verkey)
        .into_vec()
        .map_err(|e| CryptoError::InvalidKey(format!("{verkey} is not base58: {e}")))?;
    let bytes: [u8; KEY_LEN] = raw.as_slice().try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "{verkey} must decode to {KEY_LEN} bytes, got {}",
            raw.len()
        ))
    })?;
    Ok(PublicKey::from(bytes))
}
