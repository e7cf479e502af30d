//! Stream error types.

use sessionmux_core::Address;

/// Errors surfaced to holders of a session.
///
/// `Clone` because errors ride the multicast feeds alongside events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Channel context closed: {id}")]
    ChannelClosed { id: String },

    #[error("Remote stream error: {0}")]
    Remote(String),

    #[error("Delivery to {address} failed: {reason}")]
    DeliveryFailed { address: Address, reason: String },

    #[error("Connection to {address} lost: {reason}")]
    ConnectionLost { address: Address, reason: String },
}
