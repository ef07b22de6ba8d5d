//! Test harness: a recording crypto capability.
//!
//! `RecordingCapability` does no cryptography. A "packed" message is plain
//! JSON naming who it was sealed for, which makes every layer inspectable
//! in tests:
//!
//! ```json
//! { "sealed_for": ["<key>", ...], "sender": "<key>" | null, "payload": { ... } }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use agentwire_crypto::CryptoError;

use crate::capability::{DecryptedMessage, PackCapability};
use crate::types::WireMessage;

/// One successful `pack` call as seen by the capability.
#[derive(Clone, Debug, PartialEq)]
pub struct PackCall {
    /// Plaintext parsed back into JSON
    pub plaintext: Value,
    pub recipient_keys: Vec<String>,
    pub sender_key: Option<String>,
}

#[derive(Default)]
pub struct RecordingCapability {
    calls: Mutex<Vec<PackCall>>,
    attempts: AtomicUsize,
    fail_at: Option<usize>,
    delay: Option<Duration>,
}

impl RecordingCapability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the pack call with zero-based index `call`.
    pub fn failing_at(mut self, call: usize) -> Self {
        self.fail_at = Some(call);
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Completed pack calls, oldest first.
    pub fn calls(&self) -> Vec<PackCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Pack calls started, including failed and timed out ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PackCapability for RecordingCapability {
    async fn pack(
        &self,
        plaintext: &[u8],
        recipient_keys: &[String],
        sender_key: Option<&str>,
    ) -> Result<WireMessage, CryptoError> {
        let index = self.attempts.fetch_add(1, Ordering::Relaxed);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(index) {
            return Err(CryptoError::Backend(format!(
                "injected failure at call {}",
                index
            )));
        }
        if recipient_keys.is_empty() {
            return Err(CryptoError::NoRecipients);
        }

        let payload: Value = serde_json::from_slice(plaintext)
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;

        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PackCall {
                plaintext: payload.clone(),
                recipient_keys: recipient_keys.to_vec(),
                sender_key: sender_key.map(str::to_string),
            });

        Ok(WireMessage::new(json!({
            "sealed_for": recipient_keys,
            "sender": sender_key,
            "payload": payload,
        })))
    }

    async fn unpack(&self, message: &WireMessage) -> Result<DecryptedMessage, CryptoError> {
        let json = message.as_json();
        let recipient_key = json["sealed_for"]
            .get(0)
            .and_then(Value::as_str)
            .ok_or_else(|| CryptoError::Malformed("missing sealed_for".into()))?
            .to_string();
        let payload = json
            .get("payload")
            .ok_or_else(|| CryptoError::Malformed("missing payload".into()))?;
        let plaintext =
            serde_json::to_vec(payload).map_err(|e| CryptoError::Backend(e.to_string()))?;

        Ok(DecryptedMessage {
            plaintext,
            sender_key: json["sender"].as_str().map(str::to_string),
            recipient_key,
        })
    }
}
