//! In-memory wallet holding the local key pairs.
//!
//! The wallet is the key store behind `pack`/`unpack`: packing looks up the
//! sender secret, unpacking selects the first addressed key held here.

use std::collections::HashMap;

use zeroize::Zeroizing;

use crate::envelope::{open, seal, Opened};
use crate::error::CryptoError;
use crate::jwe::Jwe;
use crate::keys::KeyPair;

#[derive(Default)]
pub struct Wallet {
    keys: HashMap<String, KeyPair>,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a new key pair, store it and return its verkey.
    pub fn create_key(&mut self) -> String {
        self.insert(KeyPair::generate())
    }

    /// Store an existing key pair and return its verkey.
    pub fn insert(&mut self, pair: KeyPair) -> String {
        let verkey = pair.verkey();
        self.keys.insert(verkey.clone(), pair);
        verkey
    }

    /// Import a base58 encoded secret and return its verkey.
    pub fn import_secret(&mut self, secret: &str) -> Result<String, CryptoError> {
        let pair = KeyPair::from_base58_secret(secret)?;
        Ok(self.insert(pair))
    }

    /// Export the base58 encoded secret of a stored key.
    pub fn export_secret(&self, verkey: &str) -> Result<Zeroizing<String>, CryptoError> {
        self.keys
            .get(verkey)
            .map(KeyPair::secret_base58)
            .ok_or_else(|| CryptoError::KeyNotFound(verkey.to_string()))
    }

    pub fn has_key(&self, verkey: &str) -> bool {
        self.keys.contains_key(verkey)
    }

    /// Stored verkeys, sorted.
    pub fn verkeys(&self) -> Vec<String> {
        let mut out: Vec<String> = self.keys.keys().cloned().collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Seal `plaintext` for `recipients`, authenticated as `sender_verkey` if given.
    ///
    /// The sender must be a key held by this wallet.
    pub fn pack(
        &self,
        plaintext: &[u8],
        recipients: &[String],
        sender_verkey: Option<&str>,
    ) -> Result<Jwe, CryptoError> {
        let sender = match sender_verkey {
            Some(verkey) => Some(
                self.keys
                    .get(verkey)
                    .ok_or_else(|| CryptoError::KeyNotFound(verkey.to_string()))?,
            ),
            None => None,
        };
        seal(plaintext, recipients, sender)
    }

    /// Open an envelope addressed to any key held by this wallet.
    pub fn unpack(&self, jwe: &Jwe) -> Result<Opened, CryptoError> {
        open(jwe, |kid| self.keys.get(kid).cloned())
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("verkeys", &self.verkeys())
            .finish()
    }
}
