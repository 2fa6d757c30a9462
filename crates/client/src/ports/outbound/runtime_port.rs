//! Embedded game runtime port
//!
//! The host side of the bridge only needs a way to push envelopes into the
//! runtime; inbound envelopes are handed to [`GameBridge::receive`] by
//! whoever owns the runtime.
//!
//! [`GameBridge::receive`]: crate::infrastructure::game_bridge::GameBridge::receive

use thiserror::Error;

use scenesync_shared::BridgeEnvelope;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("game runtime channel closed")]
    ChannelClosed,

    #[error("failed to encode bridge payload: {0}")]
    Encode(String),
}

/// Delivery into the embedded game runtime. Must not block.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait RuntimeChannel: Send + Sync {
    fn deliver(&self, envelope: BridgeEnvelope) -> Result<(), BridgeError>;
}
