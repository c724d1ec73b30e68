//! Selection and filter handles
//!
//! A handle is a widget's endpoint into one channel of one group. Writes
//! update the group synchronously; callbacks registered with [`Handle::on`]
//! run later, when the registry's event bus delivers the change.
//!
//! Callbacks fire for every change on the channel, including changes made
//! through the same handle. Widgets that do not want to re-apply their own
//! writes compare [`ChangeEvent::originator`] with [`Handle::id`].

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::HandleError;
use crate::events::{ChangeEvent, Channel, HandleId, Listeners, SubscriptionId};
use crate::key::{key_set_from_json, GroupName, KeySet};
use crate::registry::{GroupState, Registry};

/// Read/write/subscribe endpoint bound to a group channel
pub struct Handle {
    id: HandleId,
    owner: Option<String>,
    channel: Channel,
    registry: Registry,
    group: Option<Arc<GroupState>>,
    listeners: Arc<Listeners>,
}

impl Handle {
    pub(crate) fn new(
        registry: Registry,
        group: Option<&GroupName>,
        channel: Channel,
        owner: Option<&str>,
    ) -> Self {
        let id = HandleId::new();
        let mut handle = Self {
            id,
            owner: owner.map(str::to_string),
            channel,
            registry,
            group: None,
            listeners: Arc::new(Listeners::new(id)),
        };
        handle.set_group(group);
        handle
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Label of the widget that owns this handle
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn group(&self) -> Option<&GroupName> {
        self.group.as_ref().map(|state| state.name())
    }

    pub fn is_bound(&self) -> bool {
        self.group.is_some()
    }

    /// Whether this handle produced `event`
    pub fn is_origin_of(&self, event: &ChangeEvent) -> bool {
        event.is_from(self.id)
    }

    /// Replace the channel value. `None` clears the selection, or shows all
    /// rows on the filter channel.
    pub fn set(&self, value: Option<KeySet>) -> Result<(), HandleError> {
        self.write(value, None)
    }

    /// Like [`Handle::set`], attaching extra data to the emitted event
    pub fn set_with_extra(
        &self,
        value: Option<KeySet>,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), HandleError> {
        self.write(value, Some(extra))
    }

    /// Set from a loosely typed value: `null` or an array of keys.
    /// The group is left untouched if the value is rejected.
    pub fn set_json(&self, value: &serde_json::Value) -> Result<(), HandleError> {
        let keys = key_set_from_json(value)?;
        self.write(keys, None)
    }

    pub fn clear(&self) -> Result<(), HandleError> {
        self.write(None, None)
    }

    /// Current channel value, `None` when unbound
    pub fn get(&self) -> Option<KeySet> {
        self.group.as_ref().and_then(|state| state.value(self.channel))
    }

    /// Register a callback for change events on this channel.
    ///
    /// Callbacks of one handle run in registration order. An error or panic
    /// is reported by the dispatcher and does not affect other callbacks.
    pub fn on<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(callback))
    }

    /// Remove one callback. Returns false if it was not registered here.
    pub fn off(&self, subscription: SubscriptionId) -> bool {
        self.listeners.remove(subscription)
    }

    pub fn off_all(&self) {
        self.listeners.clear();
    }

    /// Number of registered callbacks
    pub fn subscription_count(&self) -> usize {
        self.listeners.len()
    }

    /// Move this handle to another group, keeping its callbacks.
    /// `None` leaves the handle unbound.
    pub fn set_group(&mut self, group: Option<&GroupName>) {
        if self.group() == group {
            return;
        }

        self.detach();
        if let Some(name) = group {
            let state = self.registry.resolve(name);
            state.subscribe(self.channel, &self.listeners);
            debug!(handle = %self.id, group = %name, channel = %self.channel, "handle bound");
            self.group = Some(state);
        }
    }

    /// Unsubscribe and give up this handle's reference on its group
    pub fn release(&mut self) {
        self.detach();
        self.listeners.clear();
    }

    fn detach(&mut self) {
        if let Some(state) = self.group.take() {
            state.unsubscribe(self.channel, self.id);
            self.registry.release_state(&state);
            debug!(handle = %self.id, group = %state.name(), channel = %self.channel, "handle unbound");
        }
    }

    fn write(
        &self,
        value: Option<KeySet>,
        extra: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<(), HandleError> {
        let state = self.group.as_ref().ok_or(HandleError::Unbound(self.id))?;
        if state.is_closed() {
            warn!(handle = %self.id, group = %state.name(), "write to a released group rejected");
            return Err(HandleError::GroupClosed(state.name().clone()));
        }
        state.update(self.channel, value, self.id, extra, self.registry.bus());
        Ok(())
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("channel", &self.channel)
            .field("group", &self.group())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::key_set;
    use parking_lot::Mutex;
    use serde_json::json;

    type Log = Arc<Mutex<Vec<ChangeEvent>>>;

    fn record(handle: &Handle) -> Log {
        let log: Log = Arc::default();
        let sink = log.clone();
        handle.on(move |event| {
            sink.lock().push(event.clone());
            Ok(())
        });
        log
    }

    #[test]
    fn test_set_then_get() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let h1 = registry.selection_handle(&group);
        let h2 = registry.selection_handle(&group);

        h1.set(Some(key_set(["a", "b"]))).unwrap();
        assert_eq!(h1.get(), Some(key_set(["a", "b"])));
        assert_eq!(h2.get(), Some(key_set(["a", "b"])));
    }

    #[test]
    fn test_last_write_wins() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let handles: Vec<_> = (0..3).map(|_| registry.filter_handle(&group)).collect();

        handles[0].set(Some(key_set(["1"]))).unwrap();
        handles[2].set(Some(key_set(["2", "3"]))).unwrap();
        handles[1].set(Some(key_set(["4"]))).unwrap();

        for handle in &handles {
            assert_eq!(handle.get(), Some(key_set(["4"])));
        }
    }

    #[test]
    fn test_delivery_is_deferred() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let h1 = registry.selection_handle(&group);
        let h2 = registry.selection_handle(&group);
        let log = record(&h2);

        h1.set(Some(key_set(["a"]))).unwrap();
        assert!(log.lock().is_empty());
        assert_eq!(registry.pending_events(), 1);

        let report = registry.flush();
        assert_eq!(report.events, 1);
        assert_eq!(log.lock().len(), 1);
        assert_eq!(registry.pending_events(), 0);
    }

    #[test]
    fn test_linked_selection_scenario() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let h1 = registry.selection_handle(&group);
        let h2 = registry.selection_handle(&group);
        let log1 = record(&h1);
        let log2 = record(&h2);

        h1.set(Some(key_set(["b"]))).unwrap();
        registry.flush();

        let received = log2.lock()[0].clone();
        assert_eq!(received.value, Some(key_set(["b"])));
        assert_eq!(received.previous, None);
        assert_eq!(received.originator, h1.id());
        assert_eq!(h2.get(), Some(key_set(["b"])));

        h2.set(None).unwrap();
        registry.flush();

        let seen = log1.lock().last().cloned().unwrap();
        assert_eq!(seen.value, None);
        assert_eq!(seen.previous, Some(key_set(["b"])));
        assert_eq!(seen.originator, h2.id());
    }

    #[test]
    fn test_echo_reaches_originator() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let h1 = registry.selection_handle(&group);
        let h2 = registry.selection_handle(&group);
        let log1 = record(&h1);
        let log2 = record(&h2);

        h1.set(Some(key_set(["k1"]))).unwrap();
        registry.flush();

        let own = log1.lock()[0].clone();
        let other = log2.lock()[0].clone();
        assert!(h1.is_origin_of(&own));
        assert!(!h2.is_origin_of(&other));
        assert_eq!(own.originator, other.originator);
        assert_eq!(own, other);
    }

    #[test]
    fn test_selection_empty_equals_none() {
        let registry = Registry::new();
        let h = registry.selection_handle(&GroupName::from("G"));
        h.set(Some(key_set(["a"]))).unwrap();
        h.set(Some(KeySet::new())).unwrap();
        assert_eq!(h.get(), None);
    }

    #[test]
    fn test_filter_empty_differs_from_none() {
        let registry = Registry::new();
        let h = registry.filter_handle(&GroupName::from("G"));
        h.set(Some(KeySet::new())).unwrap();
        assert_eq!(h.get(), Some(KeySet::new()));
        h.clear().unwrap();
        assert_eq!(h.get(), None);
    }

    #[test]
    fn test_channels_are_independent() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let selection = registry.selection_handle(&group);
        let filter = registry.filter_handle(&group);
        let selection_log = record(&selection);
        let filter_log = record(&filter);

        selection.set(Some(key_set(["a"]))).unwrap();
        filter.set(Some(key_set(["a", "b"]))).unwrap();
        selection.set(Some(key_set(["c"]))).unwrap();
        filter.set(None).unwrap();
        registry.flush();

        assert_eq!(selection.get(), Some(key_set(["c"])));
        assert_eq!(filter.get(), None);

        let selection_history: Vec<_> = selection_log.lock().iter().map(|e| e.value.clone()).collect();
        let filter_history: Vec<_> = filter_log.lock().iter().map(|e| e.value.clone()).collect();
        assert_eq!(selection_history, vec![Some(key_set(["a"])), Some(key_set(["c"]))]);
        assert_eq!(filter_history, vec![Some(key_set(["a", "b"])), None]);
        assert!(selection_log.lock().iter().all(|e| e.channel == Channel::Selection));
    }

    #[test]
    fn test_unrelated_groups_are_isolated() {
        let registry = Registry::new();
        let a = registry.selection_handle(&registry.generate_group_name());
        let b = registry.selection_handle(&registry.generate_group_name());
        let log = record(&b);

        a.set(Some(key_set(["x"]))).unwrap();
        registry.flush();
        assert_eq!(b.get(), None);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_events_keep_set_order() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let writer = registry.selection_handle(&group);
        let reader = registry.selection_handle(&group);
        let log = record(&reader);

        for key in ["1", "2", "3", "4"] {
            writer.set(Some(key_set([key]))).unwrap();
        }
        registry.run_tick();

        let sequences: Vec<u64> = log.lock().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        let last = log.lock().last().cloned().unwrap();
        assert_eq!(last.previous, Some(key_set(["3"])));
    }

    #[test]
    fn test_failing_subscriber_is_isolated() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let h1 = registry.selection_handle(&group);
        let h2 = registry.selection_handle(&group);
        let h3 = registry.selection_handle(&group);

        h1.on(|_| anyhow::bail!("render failed"));
        h2.on(|_| panic!("widget bug"));
        let log = record(&h3);

        h1.set(Some(key_set(["a"]))).unwrap();
        let report = registry.flush();

        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].handle, h1.id());
        assert!(report.errors[0].message.contains("render failed"));
        assert!(report.errors[1].message.contains("widget bug"));
        assert_eq!(log.lock().len(), 1);
        assert_eq!(h3.get(), Some(key_set(["a"])));
    }

    #[test]
    fn test_callbacks_run_in_registration_order() {
        let registry = Registry::new();
        let h = registry.selection_handle(&GroupName::from("G"));
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            h.on(move |_| {
                order.lock().push(i);
                Ok(())
            });
        }

        h.set(Some(key_set(["a"]))).unwrap();
        registry.flush();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_off_removes_callback() {
        let registry = Registry::new();
        let h = registry.selection_handle(&GroupName::from("G"));
        let log = record(&h);
        let extra = h.on(|_| anyhow::bail!("should not run"));

        assert!(h.off(extra));
        assert!(!h.off(extra));
        h.set(Some(key_set(["a"]))).unwrap();
        let report = registry.flush();
        assert!(report.is_clean());
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_set_inside_callback_is_deferred() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let source = registry.selection_handle(&group);
        let mirror = Arc::new(registry.filter_handle(&group));

        let target = mirror.clone();
        source.on(move |event| {
            target.set(event.value.clone())?;
            Ok(())
        });

        source.set(Some(key_set(["a"]))).unwrap();
        let first = registry.run_tick();
        assert_eq!(first.events, 1);
        assert_eq!(mirror.get(), Some(key_set(["a"])));
        assert_eq!(registry.pending_events(), 1);

        let rest = registry.flush();
        assert_eq!(rest.ticks, 1);
        assert_eq!(registry.pending_events(), 0);
    }

    #[test]
    fn test_flush_bounded_for_feedback_loops() {
        let registry = Registry::with_config(crate::registry::RegistryConfig {
            max_ticks_per_flush: 5,
            ..Default::default()
        });
        let group = GroupName::from("G");
        let a = Arc::new(registry.selection_handle(&group));
        let b = Arc::new(registry.selection_handle(&group));

        // Two widgets that re-assert every change they see, ignoring origin
        for handle in [&a, &b] {
            let this = handle.clone();
            handle.on(move |event| {
                this.set(event.value.clone())?;
                Ok(())
            });
        }

        a.set(Some(key_set(["x"]))).unwrap();
        let report = registry.flush();
        assert_eq!(report.ticks, 5);
        assert!(registry.pending_events() > 0);
    }

    #[test]
    fn test_echo_suppression_stops_loops() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let a = Arc::new(registry.selection_handle(&group));
        let b = Arc::new(registry.selection_handle(&group));

        for handle in [&a, &b] {
            let this = Arc::downgrade(handle);
            handle.on(move |event| {
                let Some(this) = this.upgrade() else { return Ok(()) };
                if !this.is_origin_of(event) && this.get() != event.value {
                    this.set(event.value.clone())?;
                }
                Ok(())
            });
        }

        a.set(Some(key_set(["x"]))).unwrap();
        let report = registry.flush();
        assert_eq!(report.ticks, 1);
        assert_eq!(registry.pending_events(), 0);
    }

    #[test]
    fn test_set_json_rejects_scalar() {
        let registry = Registry::new();
        let h = registry.selection_handle(&GroupName::from("G"));
        h.set_json(&json!(["a", 1])).unwrap();

        let err = h.set_json(&json!("a")).unwrap_err();
        assert!(matches!(err, HandleError::InvalidValue(_)));
        assert_eq!(h.get(), Some(key_set(["a", "1"])));
        assert_eq!(registry.pending_events(), 1);
    }

    #[test]
    fn test_extra_is_forwarded() {
        let registry = Registry::new();
        let h = registry.selection_handle(&GroupName::from("G"));
        let log = record(&h);

        let mut extra = serde_json::Map::new();
        extra.insert("source".to_string(), json!("brush"));
        h.set_with_extra(Some(key_set(["a"])), extra).unwrap();
        registry.flush();

        let event = log.lock()[0].clone();
        assert_eq!(event.extra.unwrap()["source"], json!("brush"));
    }

    #[test]
    fn test_unbound_handle() {
        let registry = Registry::new();
        let h = registry.bind(None, Channel::Selection, Some("table"));
        assert!(!h.is_bound());
        assert_eq!(h.get(), None);
        assert!(matches!(h.set(None), Err(HandleError::Unbound(_))));
        assert_eq!(h.owner(), Some("table"));
    }

    #[test]
    fn test_set_group_moves_callbacks() {
        let registry = Registry::new();
        let first = GroupName::from("first");
        let second = GroupName::from("second");

        let mut h = registry.selection_handle(&first);
        let log = record(&h);
        let writer = registry.selection_handle(&second);

        h.set_group(Some(&second));
        assert!(registry.peek(&first).is_none());
        assert_eq!(registry.ref_count(&second), 2);

        writer.set(Some(key_set(["z"]))).unwrap();
        registry.flush();
        assert_eq!(log.lock().len(), 1);
        assert_eq!(h.get(), Some(key_set(["z"])));
    }

    #[test]
    fn test_release_stops_delivery() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let writer = registry.selection_handle(&group);
        let mut reader = registry.selection_handle(&group);
        let log = record(&reader);

        writer.set(Some(key_set(["a"]))).unwrap();
        reader.release();
        registry.flush();

        assert!(log.lock().is_empty());
        assert_eq!(reader.subscription_count(), 0);
        assert_eq!(registry.ref_count(&group), 1);
        assert_eq!(writer.get(), Some(key_set(["a"])));
    }

    #[test]
    fn test_pending_events_discarded_after_group_teardown() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let handle = registry.selection_handle(&group);
        handle.set(Some(key_set(["a"]))).unwrap();
        drop(handle);

        let report = registry.flush();
        assert_eq!(report.discarded, 1);
        assert_eq!(report.events, 0);
        assert!(registry.peek(&group).is_none());
    }

    #[test]
    fn test_extra_release_does_not_touch_newer_group() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let stale = registry.selection_handle(&group);

        // Host gives up the handle's reference behind its back
        registry.release(&group);
        assert!(registry.peek(&group).is_none());
        assert!(matches!(
            stale.set(Some(key_set(["a"]))),
            Err(HandleError::GroupClosed(_))
        ));
        assert_eq!(registry.pending_events(), 0);

        let fresh = registry.selection_handle(&group);
        let log = record(&fresh);
        drop(stale);
        assert_eq!(registry.ref_count(&group), 1);

        fresh.set(Some(key_set(["x"]))).unwrap();
        let report = registry.flush();
        assert_eq!(report.discarded, 0);
        assert_eq!(report.events, 1);
        assert_eq!(log.lock().len(), 1);
        assert_eq!(fresh.get(), Some(key_set(["x"])));
    }

    #[test]
    fn test_concurrent_sets_keep_channel_order() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let reader = registry.filter_handle(&group);
        let log = record(&reader);

        std::thread::scope(|scope| {
            for t in 0..8 {
                let registry = &registry;
                let group = &group;
                scope.spawn(move || {
                    let writer = registry.filter_handle(group);
                    for i in 0..200 {
                        writer.set(Some(key_set([format!("{t}-{i}")]))).unwrap();
                    }
                });
            }
        });

        let report = registry.flush();
        assert_eq!(report.events, 1600);
        assert!(report.errors.is_empty());

        let events = log.lock();
        assert_eq!(events.len(), 1600);
        assert_eq!(events[0].previous, None);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.sequence, i as u64 + 1);
            if i > 0 {
                assert_eq!(event.previous, events[i - 1].value);
            }
        }
        assert_eq!(reader.get(), events[1599].value);
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_events() {
        let registry = Registry::new();
        let group = GroupName::from("G");
        let h1 = registry.selection_handle(&group);
        let h2 = registry.selection_handle(&group);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        h2.on(move |event| {
            tx.send(event.clone())?;
            Ok(())
        });

        let dispatcher = registry.spawn_dispatcher();
        h1.set(Some(key_set(["b"]))).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.value, Some(key_set(["b"])));
        assert_eq!(event.originator, h1.id());

        drop(h1);
        drop(h2);
        drop(registry);
        dispatcher.await.unwrap();
    }
}
