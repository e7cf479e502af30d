//! The transport side consumed by the factory.

use sessionmux_core::StreamMessage;

use crate::event::EventStream;

/// A listening transport that has already decoded frames into envelopes.
///
/// Implementations own sockets, framing and reconnection; the factory only
/// sees decoded events and hands back messages to send.
pub trait RemoteStreamSource: Send + Sync + 'static {
    /// `Event::ReadSuccess` for every decoded inbound message.
    fn listen_read_success(&self) -> EventStream;

    /// `Event::ChannelContextClosed` whenever a connection goes away.
    fn listen_channel_context_closed(&self) -> EventStream;

    /// Fire-and-forget send routed by the message's sender id. Failures are
    /// reported as closed events for the affected address, not here.
    /// Must not close the factory that is sending.
    fn send(&self, message: StreamMessage);
}
