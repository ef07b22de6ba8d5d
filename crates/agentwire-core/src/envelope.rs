//! Envelope service: packs outbound messages and unpacks one layer of inbound ones.
//!
//! Packing encrypts the payload for the final recipients, then wraps the
//! result once per routing key:
//!
//! ```text
//! wire_0 = pack(payload, recipient_keys, sender_key)
//! wire_i = pack(forward{ to: to_i, msg: wire_(i-1) }, [routing_keys[i-1]], none)
//! to_1 = recipient_keys[0], to_(i+1) = routing_keys[i-1]
//! ```
//!
//! Only the outermost envelope is returned. Any capability failure aborts the
//! whole call with no envelope returned.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use agentwire_crypto::CryptoError;
use serde_json::Value;

use crate::capability::PackCapability;
use crate::config::EnvelopeConfig;
use crate::errors::{EnvelopeError, Layer};
use crate::forward::ForwardMessage;
use crate::message::{encode_message, AgentMessage};
use crate::types::{EnvelopeKeys, UnpackedMessageContext, WireMessage};

pub struct EnvelopeService {
    capability: Arc<dyn PackCapability>,
    config: EnvelopeConfig,
}

impl EnvelopeService {
    pub fn new(capability: Arc<dyn PackCapability>, config: EnvelopeConfig) -> Self {
        Self { capability, config }
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    /// Encrypt `payload` for `keys.recipient_keys` and wrap it for every routing key.
    ///
    /// Performs exactly `routing_keys.len() + 1` capability calls on success.
    /// Forward layers are always anonymous; only the innermost layer carries
    /// the sender key. Forwarding always targets `recipient_keys[0]`.
    pub async fn pack_message<M>(
        &self,
        payload: &M,
        keys: EnvelopeKeys,
    ) -> Result<WireMessage, EnvelopeError>
    where
        M: AgentMessage + ?Sized,
    {
        keys.validate()?;
        let EnvelopeKeys {
            recipient_keys,
            routing_keys,
            sender_key,
        } = keys;

        let first_recipient = recipient_keys.first().cloned().ok_or_else(|| {
            EnvelopeError::Configuration("recipient_keys must not be empty".into())
        })?;

        if recipient_keys.len() > 1 && !routing_keys.is_empty() {
            if self.config.reject_multi_recipient_routing {
                return Err(EnvelopeError::UnsupportedOperation(format!(
                    "forwarding to {} recipients through mediators; only one forward target is supported",
                    recipient_keys.len()
                )));
            }
            warn!(
                recipients = recipient_keys.len(),
                forward_to = %first_recipient,
                "routing a multi-recipient message; mediators forward to the first recipient only"
            );
        }

        let legacy = self.config.use_legacy_did_sov_prefix;

        let plaintext = encode_message(payload, legacy)?;
        let inner = self
            .call_pack(Layer::Inner, &plaintext, &recipient_keys, sender_key.as_deref())
            .await?;
        debug!(
            recipients = recipient_keys.len(),
            authenticated = sender_key.is_some(),
            hops = routing_keys.len(),
            "packed inner layer"
        );

        // (envelope so far, key the next forward instruction points at)
        let mut wire = inner;
        let mut next_to = first_recipient;

        for (hop, routing_key) in routing_keys.into_iter().enumerate() {
            let forward = ForwardMessage::new(next_to, wire);
            let plaintext = encode_message(&forward, legacy)?;
            let hop_recipients = vec![routing_key];

            wire = self
                .call_pack(Layer::Forward { hop }, &plaintext, &hop_recipients, None)
                .await?;
            debug!(hop, to = %forward.to, via = %hop_recipients[0], "wrapped forward layer");

            next_to = hop_recipients.into_iter().next().unwrap_or_default();
        }

        Ok(wire)
    }

    /// Decrypt exactly one layer of `message`.
    ///
    /// A returned forward message is not followed; see [`crate::relay`].
    pub async fn unpack_message(
        &self,
        message: &WireMessage,
    ) -> Result<UnpackedMessageContext, EnvelopeError> {
        let decrypted = self
            .guard(Layer::Unpack, |_| None, self.capability.unpack(message))
            .await?;

        let payload: Value = serde_json::from_slice(&decrypted.plaintext).map_err(|e| {
            EnvelopeError::MalformedMessage(format!("decrypted payload is not JSON: {}", e))
        })?;
        if !payload.is_object() {
            return Err(EnvelopeError::MalformedMessage(
                "decrypted payload must be a JSON object".into(),
            ));
        }

        debug!(
            recipient_key = %decrypted.recipient_key,
            authenticated = decrypted.sender_key.is_some(),
            "unpacked one layer"
        );

        Ok(UnpackedMessageContext {
            message: payload,
            sender_key: decrypted.sender_key,
            recipient_key: decrypted.recipient_key,
        })
    }

    async fn call_pack(
        &self,
        layer: Layer,
        plaintext: &[u8],
        recipient_keys: &[String],
        sender_key: Option<&str>,
    ) -> Result<WireMessage, EnvelopeError> {
        self.guard(
            layer,
            |source| Some(failed_pack_key(source, recipient_keys, sender_key)),
            self.capability.pack(plaintext, recipient_keys, sender_key),
        )
        .await
    }

    /// Run one capability call under the configured timeout and attach
    /// layer and key to any failure.
    async fn guard<T, F, K>(&self, layer: Layer, key_for: K, call: F) -> Result<T, EnvelopeError>
    where
        F: Future<Output = Result<T, CryptoError>>,
        K: FnOnce(&CryptoError) -> Option<String>,
    {
        let result = match self.config.crypto_timeout() {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(CryptoError::Backend(format!(
                    "timed out after {} ms",
                    limit.as_millis()
                ))),
            },
            None => call.await,
        };

        result.map_err(|source| {
            let key = key_for(&source);
            warn!(
                %layer,
                key = key.as_deref().unwrap_or("unknown"),
                error = %source,
                "crypto operation failed"
            );
            EnvelopeError::CryptoOperation { layer, key, source }
        })
    }
}

/// Key to blame for a failed pack: the sender when the capability could not
/// find it, otherwise the recipients.
fn failed_pack_key(source: &CryptoError, recipient_keys: &[String], sender_key: Option<&str>) -> String {
    match (source, sender_key) {
        (CryptoError::KeyNotFound(missing), Some(sender)) if missing == sender => sender.to_string(),
        _ => recipient_keys.join(","),
    }
}
