//! Shared state of one group

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::events::{ChangeEvent, Channel, Envelope, EventBus, HandleId, Listeners};
use crate::key::{GroupName, KeySet};

/// One channel's value and the handles listening to it
#[derive(Default)]
struct ChannelState {
    value: Option<KeySet>,
    sequence: u64,
    listeners: Vec<Weak<Listeners>>,
}

/// Selection and filter state shared by every handle bound to a group
pub struct GroupState {
    name: GroupName,
    selection: Mutex<ChannelState>,
    filter: Mutex<ChannelState>,
    closed: AtomicBool,
}

impl GroupState {
    pub(crate) fn new(name: GroupName) -> Self {
        Self {
            name,
            selection: Mutex::new(ChannelState::default()),
            filter: Mutex::new(ChannelState::default()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &GroupName {
        &self.name
    }

    /// Current value of a channel
    pub fn value(&self, channel: Channel) -> Option<KeySet> {
        self.channel(channel).lock().value.clone()
    }

    pub fn selection(&self) -> Option<KeySet> {
        self.value(Channel::Selection)
    }

    pub fn filter(&self) -> Option<KeySet> {
        self.value(Channel::Filter)
    }

    /// Number of transitions a channel has gone through
    pub fn sequence(&self, channel: Channel) -> u64 {
        self.channel(channel).lock().sequence
    }

    /// True once the last reference has been released
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.selection.lock().listeners.clear();
        self.filter.lock().listeners.clear();
    }

    /// Replace a channel's value and queue the resulting event.
    ///
    /// The event is published while the channel lock is held, so the bus
    /// sees events in the same order the writes happened.
    pub(crate) fn update(
        self: &Arc<Self>,
        channel: Channel,
        value: Option<KeySet>,
        originator: HandleId,
        extra: Option<serde_json::Map<String, serde_json::Value>>,
        bus: &EventBus,
    ) -> Arc<ChangeEvent> {
        let value = channel.normalize(value);
        let mut state = self.channel(channel).lock();
        let previous = std::mem::replace(&mut state.value, value.clone());
        state.sequence += 1;

        let event = Arc::new(ChangeEvent {
            group: self.name.clone(),
            channel,
            value,
            previous,
            originator,
            sequence: state.sequence,
            extra,
        });
        bus.publish(Envelope {
            group: self.clone(),
            event: event.clone(),
        });
        event
    }

    pub(crate) fn subscribe(&self, channel: Channel, listeners: &Arc<Listeners>) {
        let mut state = self.channel(channel).lock();
        state.listeners.retain(|weak| weak.strong_count() > 0);
        state.listeners.push(Arc::downgrade(listeners));
    }

    pub(crate) fn unsubscribe(&self, channel: Channel, handle: HandleId) {
        self.channel(channel).lock().listeners.retain(|weak| {
            weak.upgrade()
                .map(|listeners| listeners.handle() != handle)
                .unwrap_or(false)
        });
    }

    /// Live listeners of a channel, in subscription order
    pub(crate) fn listeners(&self, channel: Channel) -> Vec<Arc<Listeners>> {
        let mut state = self.channel(channel).lock();
        state.listeners.retain(|weak| weak.strong_count() > 0);
        state.listeners.iter().filter_map(Weak::upgrade).collect()
    }

    fn channel(&self, channel: Channel) -> &Mutex<ChannelState> {
        match channel {
            Channel::Selection => &self.selection,
            Channel::Filter => &self.filter,
        }
    }
}

impl std::fmt::Debug for GroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupState")
            .field("name", &self.name)
            .field("selection", &self.selection())
            .field("filter", &self.filter())
            .field("closed", &self.is_closed())
            .finish()
    }
}
