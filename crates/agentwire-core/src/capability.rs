//! The crypto capability seam.
//!
//! The envelope service never encrypts anything itself. It is handed a
//! `PackCapability` at construction and calls it once per layer.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use agentwire_crypto::{CryptoError, Jwe, Wallet};

use crate::types::WireMessage;

/// Output of one capability `unpack` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub plaintext: Vec<u8>,
    /// Present only for authenticated envelopes
    pub sender_key: Option<String>,
    /// Local key that matched
    pub recipient_key: String,
}

/// Public-key encryption of serialized messages.
///
/// Implementations must either return a complete result or an error; the
/// envelope service relies on that for atomic failure.
#[async_trait]
pub trait PackCapability: Send + Sync {
    /// Encrypt `plaintext` for `recipient_keys`, authenticated as `sender_key` if given.
    async fn pack(
        &self,
        plaintext: &[u8],
        recipient_keys: &[String],
        sender_key: Option<&str>,
    ) -> Result<WireMessage, CryptoError>;

    /// Decrypt one envelope with whichever local key it is addressed to.
    async fn unpack(&self, message: &WireMessage) -> Result<DecryptedMessage, CryptoError>;
}

/// `PackCapability` backed by an in-memory [`Wallet`].
#[derive(Clone, Default)]
pub struct WalletCapability {
    wallet: Arc<RwLock<Wallet>>,
}

impl WalletCapability {
    pub fn new(wallet: Wallet) -> Self {
        Self {
            wallet: Arc::new(RwLock::new(wallet)),
        }
    }

    /// Share a wallet that other components also write to.
    pub fn from_shared(wallet: Arc<RwLock<Wallet>>) -> Self {
        Self { wallet }
    }

    pub fn wallet(&self) -> &Arc<RwLock<Wallet>> {
        &self.wallet
    }

    /// Generate and store a new key, returning its verkey.
    pub async fn create_key(&self) -> String {
        self.wallet.write().await.create_key()
    }
}

#[async_trait]
impl PackCapability for WalletCapability {
    async fn pack(
        &self,
        plaintext: &[u8],
        recipient_keys: &[String],
        sender_key: Option<&str>,
    ) -> Result<WireMessage, CryptoError> {
        let jwe = {
            let wallet = self.wallet.read().await;
            wallet.pack(plaintext, recipient_keys, sender_key)?
        };
        Ok(WireMessage::new(jwe.to_json()?))
    }

    async fn unpack(&self, message: &WireMessage) -> Result<DecryptedMessage, CryptoError> {
        let jwe = Jwe::from_json(message.as_json().clone())?;
        let opened = {
            let wallet = self.wallet.read().await;
            wallet.unpack(&jwe)?
        };
        Ok(DecryptedMessage {
            plaintext: opened.plaintext.to_vec(),
            sender_key: opened.sender_verkey,
            recipient_key: opened.recipient_verkey,
        })
    }
}
