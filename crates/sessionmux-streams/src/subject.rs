//! Multicast publish/subscribe primitive.
//!
//! Every listener gets its own unbounded channel, so publishing never blocks
//! and a slow listener only grows its own queue. Completing the subject drops
//! all senders, which ends every listener's stream after it drains.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::event::EventStream;

/// Lock ignoring poison; the guarded state stays consistent across panics
/// because every critical section is a single insert/remove/retain.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct State<T> {
    listeners: Vec<mpsc::UnboundedSender<T>>,
    pending: VecDeque<T>,
    completed: bool,
}

pub(crate) struct Subject<T> {
    state: Mutex<State<T>>,
    /// Hold items published while nobody listens and replay them to the
    /// next listener.
    hold_unobserved: bool,
}

impl<T: Clone + Send + 'static> Subject<T> {
    /// Items published with no listener are dropped.
    pub fn new() -> Self {
        Self::with_hold(false)
    }

    /// Items published with no listener are held for the next one.
    pub fn buffered() -> Self {
        Self::with_hold(true)
    }

    fn with_hold(hold_unobserved: bool) -> Self {
        Self {
            state: Mutex::new(State {
                listeners: Vec::new(),
                pending: VecDeque::new(),
                completed: false,
            }),
            hold_unobserved,
        }
    }

    /// Register a listener. After completion the stream yields whatever was
    /// held and then ends.
    pub fn subscribe(&self) -> EventStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.state);
        for item in state.pending.drain(..) {
            let _ = tx.send(item);
        }
        if !state.completed {
            state.listeners.push(tx);
        }
        drop(state);
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    /// Publish to every live listener. Returns `false` once completed.
    pub fn next(&self, item: T) -> bool {
        let mut state = lock(&self.state);
        if state.completed {
            return false;
        }
        state.listeners.retain(|tx| tx.send(item.clone()).is_ok());
        if state.listeners.is_empty() && self.hold_unobserved {
            state.pending.push_back(item);
        }
        true
    }

    /// Terminate all listeners. Returns `false` if already completed.
    pub fn complete(&self) -> bool {
        let mut state = lock(&self.state);
        if state.completed {
            return false;
        }
        state.completed = true;
        state.listeners.clear();
        true
    }

    pub fn has_listeners(&self) -> bool {
        let mut state = lock(&self.state);
        state.listeners.retain(|tx| !tx.is_closed());
        !state.listeners.is_empty()
    }
}
