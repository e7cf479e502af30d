//! Events flowing between the transport, channel contexts and the bus.

use std::pin::Pin;

use sessionmux_core::{Address, StreamMessage};
use tokio_stream::Stream;

use crate::error::StreamError;

/// Lazy sequence of items handed to listeners.
pub type EventStream<T = Event> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Address-tagged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A message arrived from `address`.
    ReadSuccess {
        address: Address,
        message: StreamMessage,
    },
    /// Application code wrote a message towards `address`.
    Write {
        address: Address,
        message: StreamMessage,
    },
    /// The connection for `address` is gone. `error` is set when the
    /// closure was caused by a failure rather than an orderly shutdown.
    ChannelContextClosed {
        address: Address,
        error: Option<StreamError>,
    },
}

impl Event {
    pub const fn address(&self) -> &Address {
        match self {
            Self::ReadSuccess { address, .. }
            | Self::Write { address, .. }
            | Self::ChannelContextClosed { address, .. } => address,
        }
    }

    pub const fn message(&self) -> Option<&StreamMessage> {
        match self {
            Self::ReadSuccess { message, .. } | Self::Write { message, .. } => Some(message),
            Self::ChannelContextClosed { .. } => None,
        }
    }

    pub const fn error(&self) -> Option<&StreamError> {
        match self {
            Self::ChannelContextClosed { error, .. } => error.as_ref(),
            _ => None,
        }
    }
}
