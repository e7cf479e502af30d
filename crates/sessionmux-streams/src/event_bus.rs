//! Address-scoped event multicaster.
//!
//! Channel contexts subscribe under the address they were created with; an
//! event posted for an address reaches every context registered there. The
//! bus holds weak references only, the registry owns the contexts.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use sessionmux_core::Address;
use tracing::{debug, info};

use crate::channel::ChannelContext;
use crate::event::Event;
use crate::subject::lock;

type Subscriptions = HashMap<Address, Vec<Weak<ChannelContext>>>;

/// Local event bus keyed by [`Address`].
pub struct LocalEventBus {
    /// `None` once closed.
    subscriptions: Mutex<Option<Subscriptions>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Register `context` under its own address. Returns `false` if the bus
    /// is already closed.
    pub fn subscribe(&self, context: &Arc<ChannelContext>) -> bool {
        let mut guard = lock(&self.subscriptions);
        let Some(subscriptions) = guard.as_mut() else {
            return false;
        };
        let entry = subscriptions.entry(context.address().clone()).or_default();
        entry.retain(|weak| weak.strong_count() > 0);
        entry.push(Arc::downgrade(context));
        drop(guard);

        debug!(id = %context.id(), address = %context.address(), "Channel context bound to event bus");
        true
    }

    /// Remove `context` from its address. Returns whether it was registered.
    pub fn unsubscribe(&self, context: &ChannelContext) -> bool {
        let mut guard = lock(&self.subscriptions);
        let Some(subscriptions) = guard.as_mut() else {
            return false;
        };
        let Some(entry) = subscriptions.get_mut(context.address()) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|weak| !std::ptr::eq(weak.as_ptr(), context));
        let removed = entry.len() != before;
        if entry.is_empty() {
            subscriptions.remove(context.address());
        }
        removed
    }

    /// Deliver `event` to every context registered under `address`.
    ///
    /// A `ChannelContextClosed` event also unsubscribes everything under the
    /// address. Returns the number of contexts reached; zero is not an error.
    pub fn on_next(&self, address: &Address, event: Event) -> usize {
        let targets: Vec<Arc<ChannelContext>> = {
            let mut guard = lock(&self.subscriptions);
            let Some(subscriptions) = guard.as_mut() else {
                return 0;
            };
            let snapshot = if matches!(event, Event::ChannelContextClosed { .. }) {
                subscriptions.remove(address).unwrap_or_default()
            } else {
                subscriptions.get(address).cloned().unwrap_or_default()
            };
            snapshot.iter().filter_map(Weak::upgrade).collect()
        };

        debug!(address = %address, subscribers = targets.len(), "Event bus delivery");
        for context in &targets {
            context.on_bus_event(event.clone());
        }
        targets.len()
    }

    /// Number of live contexts under `address`.
    pub fn subscriber_count(&self, address: &Address) -> usize {
        lock(&self.subscriptions)
            .as_ref()
            .and_then(|subscriptions| subscriptions.get(address))
            .map_or(0, |entry| {
                entry.iter().filter(|weak| weak.strong_count() > 0).count()
            })
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.subscriptions).is_none()
    }

    /// Unsubscribe and close every registered context. Idempotent.
    pub fn close(&self) {
        let Some(subscriptions) = lock(&self.subscriptions).take() else {
            return;
        };

        let contexts: Vec<Arc<ChannelContext>> = subscriptions
            .into_values()
            .flatten()
            .filter_map(|weak| weak.upgrade())
            .collect();
        info!(contexts = contexts.len(), "Closing local event bus");
        for context in contexts {
            context.close();
        }
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalEventBus")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::channel::ChannelRegistry;
    use crate::error::StreamError;

    fn addr(port: u16) -> Address {
        Address::new("10.0.0.1", port)
    }

    fn closed(port: u16) -> Event {
        Event::ChannelContextClosed {
            address: addr(port),
            error: None,
        }
    }

    #[test]
    fn closed_event_reaches_only_its_address() {
        let registry = ChannelRegistry::new();
        let bus = LocalEventBus::new();
        let a1 = registry.create_if_absent("a1", &addr(1), |c| {
            bus.subscribe(c);
        });
        let a2 = registry.create_if_absent("a2", &addr(1), |c| {
            bus.subscribe(c);
        });
        let b1 = registry.create_if_absent("b1", &addr(2), |c| {
            bus.subscribe(c);
        });
        let (a1, a2, b1) = (a1.unwrap(), a2.unwrap(), b1.unwrap());

        assert_eq!(bus.on_next(&addr(1), closed(1)), 2);

        assert!(a1.is_closed());
        assert!(a2.is_closed());
        assert!(!b1.is_closed());
        assert_eq!(bus.subscriber_count(&addr(1)), 0);
        assert_eq!(bus.subscriber_count(&addr(2)), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_address_is_a_no_op() {
        let bus = LocalEventBus::new();
        assert_eq!(bus.on_next(&addr(9), closed(9)), 0);
    }

    #[test]
    fn failure_reason_is_passed_to_contexts() {
        let registry = ChannelRegistry::new();
        let bus = LocalEventBus::new();
        let ctx = registry
            .create_if_absent("a1", &addr(1), |c| {
                bus.subscribe(c);
            })
            .unwrap();

        let error = StreamError::ConnectionLost {
            address: addr(1),
            reason: "broken pipe".into(),
        };
        bus.on_next(
            &addr(1),
            Event::ChannelContextClosed {
                address: addr(1),
                error: Some(error),
            },
        );
        assert!(ctx.is_closed());
    }

    #[test]
    fn unsubscribed_context_is_not_notified() {
        let registry = ChannelRegistry::new();
        let bus = LocalEventBus::new();
        let ctx = registry
            .create_if_absent("a1", &addr(1), |c| {
                bus.subscribe(c);
            })
            .unwrap();

        assert!(bus.unsubscribe(&ctx));
        assert!(!bus.unsubscribe(&ctx));
        assert_eq!(bus.on_next(&addr(1), closed(1)), 0);
        assert!(!ctx.is_closed());
    }

    #[test]
    fn close_terminates_contexts_once() {
        let registry = ChannelRegistry::new();
        let bus = LocalEventBus::new();
        let ctx = registry
            .create_if_absent("a1", &addr(1), |c| {
                bus.subscribe(c);
            })
            .unwrap();

        bus.close();
        assert!(ctx.is_closed());
        assert!(bus.is_closed());

        bus.close();
        let late = registry.create_if_absent("a2", &addr(1), |_| {}).unwrap();
        assert!(!bus.subscribe(&late));
        assert_eq!(bus.on_next(&addr(1), closed(1)), 0);
    }
}
