//! In-process [`RemoteStreamSource`].
//!
//! Stands in for a real listening transport: callers inject decoded reads and
//! connection losses, and observe what the factory sends back. Sends are
//! routed by sender id to the address that id was last read from; sending to
//! a disconnected or unknown route is reported as a closed event carrying
//! [`StreamError::DeliveryFailed`].

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use sessionmux_core::{Address, StreamMessage};
use tracing::{debug, warn};

use crate::error::StreamError;
use crate::event::{Event, EventStream};
use crate::source::RemoteStreamSource;
use crate::subject::{Subject, lock};

#[derive(Default)]
struct Routes {
    by_sender: HashMap<String, Address>,
    connected: HashSet<Address>,
}

/// Memory-backed listening server stream.
pub struct MemoryServerStream {
    reads: Subject<Event>,
    closes: Subject<Event>,
    sent: Subject<Event>,
    routes: Mutex<Routes>,
}

impl MemoryServerStream {
    pub fn new() -> Self {
        Self {
            reads: Subject::buffered(),
            closes: Subject::buffered(),
            sent: Subject::buffered(),
            routes: Mutex::new(Routes::default()),
        }
    }

    /// Deliver a decoded inbound message from `address`.
    pub fn inject_read(&self, address: Address, message: StreamMessage) {
        {
            let mut routes = lock(&self.routes);
            if let Some(sender_id) = message.sender_id() {
                routes
                    .by_sender
                    .insert(sender_id.to_string(), address.clone());
            }
            routes.connected.insert(address.clone());
        }
        self.reads.next(Event::ReadSuccess { address, message });
    }

    /// Orderly loss of the connection for `address`.
    pub fn disconnect(&self, address: &Address) {
        self.drop_connection(address, None);
    }

    /// Connection for `address` failed with `reason`.
    pub fn fail(&self, address: &Address, reason: &str) {
        self.drop_connection(
            address,
            Some(StreamError::ConnectionLost {
                address: address.clone(),
                reason: reason.to_string(),
            }),
        );
    }

    /// `Event::Write` for every message successfully sent, tagged with the
    /// address it was routed to.
    pub fn listen_sent(&self) -> EventStream {
        self.sent.subscribe()
    }

    fn drop_connection(&self, address: &Address, error: Option<StreamError>) {
        lock(&self.routes).connected.remove(address);
        debug!(address = %address, failed = error.is_some(), "Memory connection dropped");
        self.closes.next(Event::ChannelContextClosed {
            address: address.clone(),
            error,
        });
    }
}

impl Default for MemoryServerStream {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStreamSource for MemoryServerStream {
    fn listen_read_success(&self) -> EventStream {
        self.reads.subscribe()
    }

    fn listen_channel_context_closed(&self) -> EventStream {
        self.closes.subscribe()
    }

    fn send(&self, message: StreamMessage) {
        let route = {
            let routes = lock(&self.routes);
            message
                .sender_id()
                .and_then(|id| routes.by_sender.get(id))
                .map(|address| (address.clone(), routes.connected.contains(address)))
        };

        match route {
            Some((address, true)) => {
                self.sent.next(Event::Write { address, message });
            }
            Some((address, false)) => {
                warn!(address = %address, "Send to disconnected address");
                self.closes.next(Event::ChannelContextClosed {
                    address: address.clone(),
                    error: Some(StreamError::DeliveryFailed {
                        address,
                        reason: "connection closed".to_string(),
                    }),
                });
            }
            None => {
                warn!(sender_id = ?message.sender_id(), "Send without a known route dropped");
            }
        }
    }
}
