//! Server-side stream processor factory.
//!
//! Demultiplexes the traffic of one [`RemoteStreamSource`] by sender identity:
//!
//! ```text
//! read (address, message) → create_if_absent(sender_id) → post_read_success
//!                                 └─ on create: write feed → re-tag → send
//!                                               bus.subscribe
//!                                               announce StreamProcessor
//! closed (address)        → bus.on_next(address)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use sessionmux_core::config::StreamsConfig;
use sessionmux_core::{Address, StreamMessage};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::channel::{ChannelContext, ChannelRegistry};
use crate::event::{Event, EventStream};
use crate::event_bus::LocalEventBus;
use crate::processor::StreamProcessor;
use crate::source::RemoteStreamSource;
use crate::subject::{Subject, lock};

/// Factory statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryStats {
    /// Live channel contexts.
    pub active_channels: usize,
    /// Stream processors announced since construction.
    pub announced: u64,
}

struct Inner {
    source: Arc<dyn RemoteStreamSource>,
    registry: Arc<ChannelRegistry>,
    bus: Arc<LocalEventBus>,
    /// Unbounded per listener: a slow consumer grows its own queue instead
    /// of losing announcements or stalling reads.
    announcements: Subject<StreamProcessor>,
    config: StreamsConfig,
    announced: AtomicU64,
    closed: AtomicBool,
    /// Held shared around every transport send and exclusively by `close`,
    /// so no send is in flight once `close` returns.
    send_gate: RwLock<()>,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

/// Turns one listening transport into one [`StreamProcessor`] per session.
pub struct ServerStreamProcessorFactory {
    inner: Arc<Inner>,
}

impl ServerStreamProcessorFactory {
    /// Create a factory with default settings and start listening on
    /// `source`. Must be called within a tokio runtime.
    pub fn new<S: RemoteStreamSource>(source: Arc<S>) -> Self {
        Self::with_config(source, StreamsConfig::default())
    }

    /// Create a factory and start listening on `source`. Must be called
    /// within a tokio runtime.
    pub fn with_config<S: RemoteStreamSource>(source: Arc<S>, config: StreamsConfig) -> Self {
        let source: Arc<dyn RemoteStreamSource> = source;
        let reads = source.listen_read_success();
        let closes = source.listen_channel_context_closed();

        let inner = Arc::new(Inner {
            source,
            registry: ChannelRegistry::new(),
            bus: Arc::new(LocalEventBus::new()),
            announcements: Subject::buffered(),
            config,
            announced: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            send_gate: RwLock::new(()),
            subscriptions: Mutex::new(Vec::new()),
        });

        // request logic: remote reads => channel contexts
        let read_task = tokio::spawn(Arc::clone(&inner).forward_reads(reads));
        // connection logic: connection lost => local bus
        let close_task = tokio::spawn(Arc::clone(&inner).forward_closes(closes));
        lock(&inner.subscriptions).extend([read_task, close_task]);

        debug!(require_listener = inner.config.require_listener, "Stream processor factory started");
        Self { inner }
    }

    /// Stream of newly created processors, one per distinct session identity,
    /// in creation order. Processors announced before the first listener
    /// subscribes are held for it. Ends when the factory closes.
    pub fn listen_server_stream_processor(&self) -> EventStream<StreamProcessor> {
        self.inner.announcements.subscribe()
    }

    pub fn stats(&self) -> FactoryStats {
        FactoryStats {
            active_channels: self.inner.registry.len(),
            announced: self.inner.announced.load(Ordering::Acquire),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Stop forwarding, end the announcement stream and close every bound
    /// channel context. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Drop for ServerStreamProcessorFactory {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl Inner {
    async fn forward_reads(self: Arc<Self>, mut reads: EventStream) {
        while let Some(event) = reads.next().await {
            match event {
                Event::ReadSuccess { address, message } => self.on_read_success(address, message),
                other => debug!(address = %other.address(), "Ignoring non-read event on read stream"),
            }
        }
        debug!("Remote read stream ended");
    }

    async fn forward_closes(self: Arc<Self>, mut closes: EventStream) {
        while let Some(event) = closes.next().await {
            let address = event.address().clone();
            let reached = self.bus.on_next(&address, event);
            info!(address = %address, channels = reached, "Remote connection closed");
        }
        debug!("Remote closed stream ended");
    }

    fn on_read_success(self: &Arc<Self>, address: Address, message: StreamMessage) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let Some(id) = message.sender_id().map(str::to_owned) else {
            warn!(address = %address, qualifier = message.qualifier(), "Dropping message without sender id");
            return;
        };

        if self.config.require_listener
            && self.registry.get(&id).is_none()
            && !self.announcements.has_listeners()
        {
            warn!(id = %id, address = %address, "No stream processor listener, dropping first message");
            return;
        }

        let Some(context) = self
            .registry
            .create_if_absent(&id, &address, |context| self.init_channel_context(context))
        else {
            debug!(id = %id, "Factory closed, dropping read");
            return;
        };

        debug!(id = %id, address = %address, qualifier = message.qualifier(), "Forwarding read");
        context.post_read_success(message);
    }

    /// Runs once per new context, under the registry lock.
    fn init_channel_context(self: &Arc<Self>, context: &Arc<ChannelContext>) {
        // response logic: local write => remote stream
        let writes = context.listen_write();
        let write_task = tokio::spawn(
            Arc::clone(self).forward_writes(context.id().to_string(), writes),
        );
        {
            let mut subscriptions = lock(&self.subscriptions);
            subscriptions.retain(|task| !task.is_finished());
            subscriptions.push(write_task);
        }

        self.bus.subscribe(context);

        self.announced.fetch_add(1, Ordering::AcqRel);
        self.announcements.next(StreamProcessor::new(
            Arc::clone(context),
            Arc::clone(&self.bus),
        ));
        info!(id = %context.id(), address = %context.address(), "Stream processor announced");
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        for task in lock(&self.subscriptions).drain(..) {
            task.abort();
        }
        // wait out sends already past the closed check
        drop(self.send_gate.write().unwrap_or_else(PoisonError::into_inner));

        let contexts = self.registry.close();
        self.announcements.complete();
        self.bus.close();
        for context in contexts {
            context.close();
        }

        info!("Stream processor factory closed");
    }

    async fn forward_writes(self: Arc<Self>, id: String, mut writes: EventStream) {
        while let Some(event) = writes.next().await {
            let Event::Write { message, .. } = event else {
                break;
            };
            let _gate = self.send_gate.read().unwrap_or_else(PoisonError::into_inner);
            if self.closed.load(Ordering::Acquire) {
                break;
            }
            // reset outgoing message identity with the session's identity
            self.source
                .send(StreamMessage::copy_from(&message).sender_id(id.as_str()).build());
        }
        debug!(id = %id, "Write forwarding finished");
    }
}
