//! Application-facing handle for one session.

use std::sync::Arc;

use sessionmux_core::{Address, Qualifier, StreamMessage};
use tokio_stream::StreamExt;

use crate::channel::ChannelContext;
use crate::error::StreamError;
use crate::event::{Event, EventStream};
use crate::event_bus::LocalEventBus;

/// Duplex handle pairing a [`ChannelContext`] with the bus it is bound to.
///
/// Cheap to clone; every clone addresses the same session.
#[derive(Debug, Clone)]
pub struct StreamProcessor {
    context: Arc<ChannelContext>,
    bus: Arc<LocalEventBus>,
}

impl StreamProcessor {
    pub const fn new(context: Arc<ChannelContext>, bus: Arc<LocalEventBus>) -> Self {
        Self { context, bus }
    }

    /// Session identity.
    pub fn id(&self) -> &str {
        self.context.id()
    }

    pub fn address(&self) -> &Address {
        self.context.address()
    }

    pub fn is_closed(&self) -> bool {
        self.context.is_closed()
    }

    pub const fn context(&self) -> &Arc<ChannelContext> {
        &self.context
    }

    /// Write a message to the peer. The sender id is overwritten with this
    /// session's id before it reaches the transport.
    pub fn on_next(&self, message: StreamMessage) -> Result<(), StreamError> {
        self.context.post_write(message)
    }

    /// Tell the peer this side failed the stream.
    pub fn on_error(&self, reason: &str) -> Result<(), StreamError> {
        self.context.post_write(
            StreamMessage::builder()
                .qualifier(Qualifier::ON_ERROR)
                .data(reason.as_bytes().to_vec())
                .build(),
        )
    }

    /// Tell the peer this side is done writing.
    pub fn on_completed(&self) -> Result<(), StreamError> {
        self.context.post_write(
            StreamMessage::builder()
                .qualifier(Qualifier::ON_COMPLETED)
                .build(),
        )
    }

    /// Inbound messages for this session.
    ///
    /// Ends when the peer sends a completion signal or the context closes in
    /// an orderly way. A peer error signal or a failure close yields one
    /// `Err` and then ends.
    pub fn listen(&self) -> EventStream<Result<StreamMessage, StreamError>> {
        let mut reads = self.context.listen_read_success();
        Box::pin(async_stream::stream! {
            while let Some(event) = reads.next().await {
                match event {
                    Event::ReadSuccess { message, .. } => {
                        if message.qualifier() == Qualifier::ON_COMPLETED {
                            break;
                        }
                        if message.qualifier() == Qualifier::ON_ERROR {
                            let reason = message
                                .data()
                                .map(|data| String::from_utf8_lossy(data).into_owned())
                                .unwrap_or_default();
                            yield Err(StreamError::Remote(reason));
                            break;
                        }
                        yield Ok(message);
                    }
                    Event::ChannelContextClosed { error: Some(error), .. } => {
                        yield Err(error);
                        break;
                    }
                    Event::ChannelContextClosed { error: None, .. } | Event::Write { .. } => {}
                }
            }
        })
    }

    /// Unbind from the bus and close the session locally. A later message
    /// from the same identity starts a fresh session.
    pub fn close(&self) {
        self.bus.unsubscribe(&self.context);
        self.context.close();
    }
}
