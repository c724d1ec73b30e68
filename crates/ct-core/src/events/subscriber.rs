//! Per-handle callback lists

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{ChangeEvent, HandleId};

/// Callback invoked with every change event of a handle's group channel
pub type Callback = Arc<dyn Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync>;

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Identifies one registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The callbacks registered through one handle.
///
/// Owned by the handle; groups only hold weak references, so a dropped
/// handle stops receiving events even before it is unsubscribed.
pub(crate) struct Listeners {
    handle: HandleId,
    callbacks: Mutex<Vec<(SubscriptionId, Callback)>>,
}

impl Listeners {
    pub(crate) fn new(handle: HandleId) -> Self {
        Self {
            handle,
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn handle(&self) -> HandleId {
        self.handle
    }

    pub(crate) fn add(&self, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.callbacks.lock().push((id, callback));
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub(crate) fn clear(&self) {
        self.callbacks.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Copy of the callbacks in registration order, taken so that no lock
    /// is held while they run
    pub(crate) fn snapshot(&self) -> Vec<(SubscriptionId, Callback)> {
        self.callbacks.lock().clone()
    }
}
