//! In-memory waiter registry.
//!
//! Maps ticket ids to one-shot broadcast signals. Signals are volatile:
//! they exist only while someone might be parked on them and are rebuilt on
//! demand after a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

/// Latched one-shot broadcast: any number of observers may wait; a single
/// `fire` releases them all, and observers arriving after the fire return
/// immediately.
pub struct Signal {
    fired: AtomicBool,
    notify: Notify,
}

impl Signal {
    fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        if self.is_fired() {
            return;
        }
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before the re-check so a concurrent fire cannot slip
        // between the load and the await.
        notified.as_mut().enable();
        if self.is_fired() {
            return;
        }
        notified.await;
    }
}

/// Concurrent map from ticket id to its signal. The mutex is never held
/// across store operations.
#[derive(Default)]
pub struct WaiterRegistry {
    inner: Mutex<HashMap<Uuid, Arc<Signal>>>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal for `id`, created lazily.
    pub fn get_or_create(&self, id: Uuid) -> Arc<Signal> {
        let mut map = self.inner.lock();
        Arc::clone(map.entry(id).or_insert_with(|| Arc::new(Signal::new())))
    }

    /// Fire and remove the signal for `id`, reporting whether an entry
    /// existed. Idempotent: a missing entry is a no-op, and observers still
    /// holding the signal see the latched state.
    pub fn fire(&self, id: Uuid) -> bool {
        let signal = self.inner.lock().remove(&id);
        match signal {
            Some(signal) => {
                signal.fire();
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `id` without firing.
    pub fn remove(&self, id: Uuid) {
        self.inner.lock().remove(&id);
    }

    /// Drop the entry for `id` only if it still is `signal`. Used by the
    /// cancellation path so a disconnecting waiter cannot remove a signal
    /// that was re-created for someone else.
    pub fn remove_matching(&self, id: Uuid, signal: &Arc<Signal>) {
        let mut map = self.inner.lock();
        if map.get(&id).is_some_and(|s| Arc::ptr_eq(s, signal)) {
            map.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
