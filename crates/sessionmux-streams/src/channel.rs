//! Per-session channel contexts and their registry.
//!
//! A [`ChannelContext`] is the duplex endpoint of one session: inbound
//! messages go into its read feed, application writes into its write feed,
//! and a close feed signals teardown. The [`ChannelRegistry`] guarantees at
//! most one live context per session id.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use sessionmux_core::{Address, StreamMessage};
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::event::{Event, EventStream};
use crate::subject::{Subject, lock};

/// Duplex endpoint of one session.
pub struct ChannelContext {
    id: String,
    address: Address,
    read: Subject<Event>,
    write: Subject<Event>,
    close: Subject<Event>,
    closed: AtomicBool,
    /// Attached once the creation callback has returned.
    registry: OnceLock<Weak<ChannelRegistry>>,
}

impl ChannelContext {
    fn new(id: String, address: Address) -> Self {
        Self {
            id,
            address,
            // reads may arrive before the application picks up the processor
            read: Subject::buffered(),
            write: Subject::new(),
            close: Subject::buffered(),
            closed: AtomicBool::new(false),
            registry: OnceLock::new(),
        }
    }

    /// Session identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Address the context was created with.
    pub const fn address(&self) -> &Address {
        &self.address
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Push an inbound message into the read feed. Never blocks; messages
    /// posted to a closed context are dropped.
    pub fn post_read_success(&self, message: StreamMessage) {
        let event = Event::ReadSuccess {
            address: self.address.clone(),
            message,
        };
        if !self.read.next(event) {
            debug!(id = %self.id, address = %self.address, "Read on closed channel context dropped");
        }
    }

    /// Push an outbound message into the write feed.
    pub fn post_write(&self, message: StreamMessage) -> Result<(), StreamError> {
        let event = Event::Write {
            address: self.address.clone(),
            message,
        };
        if self.is_closed() || !self.write.next(event) {
            warn!(id = %self.id, address = %self.address, "Write on closed channel context rejected");
            return Err(StreamError::ChannelClosed {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Inbound `ReadSuccess` events. On a failure close a final
    /// `ChannelContextClosed` carrying the error precedes the end of stream.
    pub fn listen_read_success(&self) -> EventStream {
        self.read.subscribe()
    }

    /// Outbound `Write` events produced by the application.
    pub fn listen_write(&self) -> EventStream {
        self.write.subscribe()
    }

    /// Single `ChannelContextClosed` event, then end of stream.
    pub fn listen_close(&self) -> EventStream {
        self.close.subscribe()
    }

    /// React to an address-scoped event delivered by the bus.
    pub fn on_bus_event(&self, event: Event) {
        match event {
            Event::ChannelContextClosed { error, .. } => self.close_with(error),
            Event::ReadSuccess { message, .. } => self.post_read_success(message),
            Event::Write { .. } => {
                debug!(id = %self.id, "Ignoring write event delivered through the bus");
            }
        }
    }

    /// Orderly close: every listener sees completion, not an error.
    ///
    /// Safe inside a [`ChannelRegistry::create_if_absent`] callback: the
    /// entry is then dropped by the registry instead of released here.
    pub fn close(&self) {
        self.close_with(None);
    }

    /// Close the context, terminating all three feeds and releasing its
    /// registry entry. Idempotent.
    pub fn close_with(&self, error: Option<StreamError>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let event = Event::ChannelContextClosed {
            address: self.address.clone(),
            error,
        };
        if event.error().is_some() {
            self.read.next(event.clone());
            self.write.next(event.clone());
        }
        self.close.next(event);

        self.read.complete();
        self.write.complete();
        self.close.complete();

        if let Some(registry) = self.registry.get().and_then(Weak::upgrade) {
            registry.release(self);
        }

        info!(id = %self.id, address = %self.address, "Channel context closed");
    }
}

impl fmt::Debug for ChannelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelContext")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

struct RegistryState {
    contexts: HashMap<String, Arc<ChannelContext>>,
    closed: bool,
}

/// Registry of live channel contexts keyed by session id.
///
/// Entries are inserted only by [`create_if_absent`](Self::create_if_absent)
/// and removed only when their context closes or the registry shuts down.
pub struct ChannelRegistry {
    state: Mutex<RegistryState>,
}

impl ChannelRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RegistryState {
                contexts: HashMap::new(),
                closed: false,
            }),
        })
    }

    /// Atomic get-or-create keyed by `id`.
    ///
    /// An existing live context is returned unchanged. Otherwise a new one
    /// bound to `address` is registered and `on_create` runs with it, exactly
    /// once, before any other caller can observe it. Returns `None` once the
    /// registry is closed.
    ///
    /// `on_create` runs under the registry lock and must not call back into
    /// this registry. Closing the new context from `on_create` is allowed;
    /// the closed context is returned but not kept.
    pub fn create_if_absent<F>(
        self: &Arc<Self>,
        id: &str,
        address: &Address,
        on_create: F,
    ) -> Option<Arc<ChannelContext>>
    where
        F: FnOnce(&Arc<ChannelContext>),
    {
        let mut state = lock(&self.state);
        if state.closed {
            return None;
        }

        if let Some(existing) = state.contexts.get(id)
            && !existing.is_closed()
        {
            return Some(Arc::clone(existing));
        }

        let context = Arc::new(ChannelContext::new(id.to_string(), address.clone()));
        state.contexts.insert(id.to_string(), Arc::clone(&context));
        on_create(&context);
        let _ = context.registry.set(Arc::downgrade(self));
        // closed before the registry was attached: nobody released the entry
        if context.is_closed() {
            state.contexts.remove(id);
            drop(state);
            debug!(id, "Channel context closed during creation");
            return Some(context);
        }
        drop(state);

        info!(id, address = %address, "Created channel context");
        Some(context)
    }

    pub fn get(&self, id: &str) -> Option<Arc<ChannelContext>> {
        lock(&self.state).contexts.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further creation and hand back every registered context.
    pub fn close(&self) -> Vec<Arc<ChannelContext>> {
        let mut state = lock(&self.state);
        state.closed = true;
        state.contexts.drain().map(|(_, context)| context).collect()
    }

    fn release(&self, context: &ChannelContext) {
        let mut state = lock(&self.state);
        let is_current = state
            .contexts
            .get(context.id())
            .is_some_and(|entry| std::ptr::eq(Arc::as_ptr(entry), context));
        if is_current {
            state.contexts.remove(context.id());
            debug!(id = %context.id(), "Released channel context");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use tokio_stream::StreamExt;

    fn addr(port: u16) -> Address {
        Address::new("127.0.0.1", port)
    }

    fn msg(data: &str) -> StreamMessage {
        StreamMessage::builder()
            .qualifier("test/echo")
            .data(data.as_bytes().to_vec())
            .build()
    }

    #[test]
    fn create_runs_callback_only_for_new_ids() {
        let registry = ChannelRegistry::new();
        let calls = AtomicUsize::new(0);

        let first = registry
            .create_if_absent("s1", &addr(1), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let again = registry
            .create_if_absent("s1", &addr(2), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.address(), &addr(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_first_arrivals_create_once() {
        const THREADS: usize = 16;
        let registry = ChannelRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry
                        .create_if_absent("s1", &addr(1), |_| {
                            calls.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap()
                })
            })
            .collect();

        let contexts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(contexts.iter().all(|c| Arc::ptr_eq(c, &contexts[0])));
    }

    #[test]
    fn distinct_ids_get_distinct_contexts() {
        let registry = ChannelRegistry::new();
        let a = registry.create_if_absent("s1", &addr(1), |_| {}).unwrap();
        let b = registry.create_if_absent("s2", &addr(1), |_| {}).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn reads_are_delivered_in_post_order() {
        let registry = ChannelRegistry::new();
        let ctx = registry.create_if_absent("s1", &addr(1), |_| {}).unwrap();

        ctx.post_read_success(msg("p1"));
        ctx.post_read_success(msg("p2"));
        let reads = ctx.listen_read_success();
        ctx.post_read_success(msg("p3"));
        ctx.close();

        let payloads: Vec<_> = reads
            .map(|e| e.message().and_then(StreamMessage::data).map(<[u8]>::to_vec))
            .collect()
            .await;
        assert_eq!(
            payloads,
            vec![
                Some(b"p1".to_vec()),
                Some(b"p2".to_vec()),
                Some(b"p3".to_vec())
            ]
        );
    }

    #[tokio::test]
    async fn close_completes_feeds_and_releases_entry() {
        let registry = ChannelRegistry::new();
        let ctx = registry.create_if_absent("s1", &addr(1), |_| {}).unwrap();
        let mut writes = ctx.listen_write();
        let mut closes = ctx.listen_close();

        ctx.close();
        ctx.close();

        assert!(writes.next().await.is_none());
        let event = closes.next().await.expect("close event");
        assert_eq!(
            event,
            Event::ChannelContextClosed {
                address: addr(1),
                error: None
            }
        );
        assert!(closes.next().await.is_none());
        assert!(registry.is_empty());
        assert!(matches!(
            ctx.post_write(msg("late")),
            Err(StreamError::ChannelClosed { id }) if id == "s1"
        ));
    }

    #[tokio::test]
    async fn failure_close_reaches_read_listeners_as_error() {
        let registry = ChannelRegistry::new();
        let ctx = registry.create_if_absent("s1", &addr(1), |_| {}).unwrap();
        let reads = ctx.listen_read_success();

        let error = StreamError::ConnectionLost {
            address: addr(1),
            reason: "reset".into(),
        };
        ctx.close_with(Some(error.clone()));

        let events: Vec<_> = reads.collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error(), Some(&error));
    }

    #[test]
    fn closed_context_is_replaced_on_next_create() {
        let registry = ChannelRegistry::new();
        let old = registry.create_if_absent("s1", &addr(1), |_| {}).unwrap();
        old.close();

        let fresh = registry.create_if_absent("s1", &addr(1), |_| {}).unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert!(!fresh.is_closed());

        // closing the stale handle again must not evict the fresh entry
        old.close();
        assert!(Arc::ptr_eq(&registry.get("s1").unwrap(), &fresh));
    }

    #[test]
    fn closing_inside_create_callback_does_not_deadlock() {
        let registry = ChannelRegistry::new();

        let ctx = registry
            .create_if_absent("s1", &addr(1), |ctx| ctx.close())
            .unwrap();

        assert!(ctx.is_closed());
        assert!(registry.is_empty());
        let fresh = registry.create_if_absent("s1", &addr(1), |_| {}).unwrap();
        assert!(!fresh.is_closed());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn write_on_closed_context_is_rejected() {
        let registry = ChannelRegistry::new();
        let ctx = registry.create_if_absent("s1", &addr(1), |_| {}).unwrap();
        ctx.close();

        assert_eq!(
            ctx.post_write(msg("late")),
            Err(StreamError::ChannelClosed { id: "s1".into() })
        );
    }

    #[test]
    fn closed_registry_refuses_creation() {
        let registry = ChannelRegistry::new();
        registry.create_if_absent("s1", &addr(1), |_| {}).unwrap();

        let drained = registry.close();
        assert_eq!(drained.len(), 1);
        assert!(registry.create_if_absent("s2", &addr(1), |_| {}).is_none());
    }
}
