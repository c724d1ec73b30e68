//! Group registry
//!
//! Maps group names to their shared [`GroupState`]. A group is created the
//! first time it is resolved and torn down when its last reference is
//! released. The registry is an ordinary value: hosts create one and pass it
//! to whatever needs to bind handles, and tests build their own.

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::events::{Channel, DispatchReport, EventBus};
use crate::handle::Handle;
use crate::key::{GroupName, DEFAULT_GROUP_PREFIX};

mod group;

pub use group::GroupState;

/// Registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Upper bound on ticks run by a single `flush`, guarding against
    /// widgets that keep answering each other's events
    pub max_ticks_per_flush: usize,

    /// Prefix of generated group names
    pub group_name_prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_ticks_per_flush: 64,
            group_name_prefix: DEFAULT_GROUP_PREFIX.to_string(),
        }
    }
}

impl RegistryConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

struct GroupEntry {
    state: Arc<GroupState>,
    refs: usize,
}

struct RegistryInner {
    config: RegistryConfig,
    groups: Mutex<AHashMap<GroupName, GroupEntry>>,
    bus: EventBus,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        // Wake a parked dispatcher so it notices the registry is gone
        self.bus.notifier().notify_one();
    }
}

/// Registry of groups and their event bus
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Create a registry with default settings
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                groups: Mutex::new(AHashMap::new()),
                bus: EventBus::new(),
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Get the state of a group, creating it if needed, and take a reference
    /// on it. Every call must be paired with a [`Registry::release`].
    pub fn resolve(&self, name: &GroupName) -> Arc<GroupState> {
        let mut groups = self.inner.groups.lock();
        let entry = groups.entry(name.clone()).or_insert_with(|| {
            debug!(group = %name, "group created");
            GroupEntry {
                state: Arc::new(GroupState::new(name.clone())),
                refs: 0,
            }
        });
        entry.refs += 1;
        trace!(group = %name, refs = entry.refs, "group resolved");
        entry.state.clone()
    }

    /// Drop a reference taken by [`Registry::resolve`]. The group's state
    /// is discarded when its last reference goes away.
    pub fn release(&self, name: &GroupName) {
        let mut groups = self.inner.groups.lock();
        let Some(entry) = groups.get_mut(name) else {
            warn!(group = %name, "release of unknown group ignored");
            return;
        };

        entry.refs = entry.refs.saturating_sub(1);
        trace!(group = %name, refs = entry.refs, "group released");
        if entry.refs == 0 {
            if let Some(entry) = groups.remove(name) {
                entry.state.close();
                debug!(group = %name, "group destroyed");
            }
        }
    }

    /// Drop a reference on `state` specifically. Does nothing if the name has
    /// since been taken over by a newer group.
    pub(crate) fn release_state(&self, state: &Arc<GroupState>) {
        let name = state.name();
        let live = self
            .inner
            .groups
            .lock()
            .get(name)
            .map(|entry| Arc::ptr_eq(&entry.state, state))
            .unwrap_or(false);
        if live {
            self.release(name);
        } else {
            debug!(group = %name, "stale group reference dropped");
        }
    }

    /// Look at a live group without taking a reference
    pub fn peek(&self, name: &GroupName) -> Option<Arc<GroupState>> {
        self.inner.groups.lock().get(name).map(|entry| entry.state.clone())
    }

    /// Number of outstanding references on a group
    pub fn ref_count(&self, name: &GroupName) -> usize {
        self.inner
            .groups
            .lock()
            .get(name)
            .map(|entry| entry.refs)
            .unwrap_or(0)
    }

    pub fn group_names(&self) -> Vec<GroupName> {
        let mut names: Vec<_> = self.inner.groups.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Generate a group name no other caller will produce
    pub fn generate_group_name(&self) -> GroupName {
        GroupName::generate_with_prefix(&self.inner.config.group_name_prefix)
    }

    /// Create a handle on `channel` of `group`. A handle created without a
    /// group stays unbound until [`Handle::set_group`] is called.
    pub fn bind(&self, group: Option<&GroupName>, channel: Channel, owner: Option<&str>) -> Handle {
        Handle::new(self.clone(), group, channel, owner)
    }

    pub fn selection_handle(&self, group: &GroupName) -> Handle {
        self.bind(Some(group), Channel::Selection, None)
    }

    pub fn filter_handle(&self, group: &GroupName) -> Handle {
        self.bind(Some(group), Channel::Filter, None)
    }

    /// Number of events waiting for delivery
    pub fn pending_events(&self) -> usize {
        self.inner.bus.pending()
    }

    /// Deliver the events queued so far
    pub fn run_tick(&self) -> DispatchReport {
        self.inner.bus.run_tick()
    }

    /// Deliver events until the queue drains, bounded by
    /// [`RegistryConfig::max_ticks_per_flush`]
    pub fn flush(&self) -> DispatchReport {
        self.inner.bus.flush(self.inner.config.max_ticks_per_flush)
    }

    /// Deliver events from a tokio task, one tick per scheduler turn.
    ///
    /// Must be called from within a tokio runtime. The task ends once every
    /// clone of the registry has been dropped.
    pub fn spawn_dispatcher(&self) -> JoinHandle<()> {
        let notify = self.inner.bus.notifier();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            debug!("event dispatcher started");
            loop {
                notify.notified().await;
                loop {
                    let Some(inner) = weak.upgrade() else {
                        debug!("registry dropped, event dispatcher stopping");
                        return;
                    };
                    if inner.bus.pending() == 0 {
                        break;
                    }
                    let report = inner.bus.run_tick();
                    trace!(
                        events = report.events,
                        invocations = report.invocations,
                        errors = report.errors.len(),
                        "dispatch tick"
                    );
                    drop(inner);
                    tokio::task::yield_now().await;
                }
            }
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.inner.config)
            .field("groups", &self.group_names())
            .field("pending_events", &self.pending_events())
            .finish()
    }
}
