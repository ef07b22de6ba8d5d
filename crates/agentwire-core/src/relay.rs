//! Single-hop mediator relay.
//!
//! A relay owns one or more routing keys. For each inbound envelope it peels
//! exactly one layer and either hands the embedded envelope on to the key
//! named in the forward instruction, or delivers the message locally when
//! it is not a forward.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::envelope::EnvelopeService;
use crate::errors::EnvelopeError;
use crate::types::{UnpackedMessageContext, WireMessage};

// ============================================================================
// Relay Statistics
// ============================================================================

#[derive(Debug, Default)]
pub struct RelayStats {
    /// Envelopes handed to the relay
    pub received: AtomicU64,
    /// Embedded envelopes passed on to the next hop
    pub forwarded: AtomicU64,
    /// Non-forward messages delivered locally
    pub delivered: AtomicU64,
    /// Envelopes that could not be decrypted or parsed
    pub dropped: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.received.store(0, Ordering::Relaxed);
        self.forwarded.store(0, Ordering::Relaxed);
        self.delivered.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
    }

    fn inc_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub received: u64,
    pub forwarded: u64,
    pub delivered: u64,
    pub dropped: u64,
}

// ============================================================================
// Relay
// ============================================================================

/// What the relay decided to do with one envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// Send `message` to whoever holds `to`
    Forward { to: String, message: WireMessage },
    /// The envelope was addressed to this agent
    Deliver(UnpackedMessageContext),
}

pub struct ForwardRelay {
    service: Arc<EnvelopeService>,
    stats: Arc<RelayStats>,
}

impl ForwardRelay {
    pub fn new(service: Arc<EnvelopeService>) -> Self {
        Self {
            service,
            stats: Arc::new(RelayStats::new()),
        }
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Peel one layer of `message` and decide where it goes.
    pub async fn process(&self, message: &WireMessage) -> Result<RelayOutcome, EnvelopeError> {
        self.stats.inc_received();

        let context = self.service.unpack_message(message).await.map_err(|e| {
            warn!(error = %e, "dropping envelope that could not be unpacked");
            self.stats.inc_dropped();
            e
        })?;

        if !context.is_forward() {
            debug!(recipient_key = %context.recipient_key, "delivering message locally");
            self.stats.inc_delivered();
            return Ok(RelayOutcome::Deliver(context));
        }

        let via = context.recipient_key.clone();
        let forward = context.into_forward().map_err(|e| {
            warn!(error = %e, "dropping malformed forward message");
            self.stats.inc_dropped();
            e
        })?;

        debug!(via = %via, to = %forward.to, id = %forward.id, "forwarding envelope");
        self.stats.inc_forwarded();
        Ok(RelayOutcome::Forward {
            to: forward.to,
            message: forward.message,
        })
    }

    /// Same as [`process`](Self::process) for raw transport bytes.
    pub async fn process_bytes(&self, bytes: &[u8]) -> Result<RelayOutcome, EnvelopeError> {
        let message = match WireMessage::from_bytes(bytes) {
            Ok(message) => message,
            Err(e) => {
                self.stats.inc_received();
                self.stats.inc_dropped();
                warn!(error = %e, "dropping unparseable envelope");
                return Err(e);
            }
        };
        self.process(&message).await
    }
}
