//! agentwire core - envelope packing, unpacking and mediator forwarding.
//!
//! This crate implements:
//! - Envelope keys and the opaque wire message
//! - Transport serialization of agent messages (current and legacy type prefix)
//! - Forward messages for relaying through mediators
//! - The envelope service (packer and unpacker) over an injected crypto capability
//! - A single-hop mediator relay
//! - Configuration loading

#![forbid(unsafe_code)]

// Envelope pipeline
pub mod envelope;
pub mod forward;
pub mod message;
pub mod relay;

// Seams and supporting types
pub mod capability;
pub mod config;
pub mod errors;
pub mod types;

// Test utilities
pub mod harness;

#[cfg(test)]
mod proptests;

pub use capability::{DecryptedMessage, PackCapability, WalletCapability};
pub use config::EnvelopeConfig;
pub use envelope::EnvelopeService;
pub use errors::{EnvelopeError, Layer};
pub use forward::ForwardMessage;
pub use types::{EnvelopeKeys, UnpackedMessageContext, WireMessage};
