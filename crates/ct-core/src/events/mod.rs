//! Change events and the deferred event bus
//!
//! `set` on a handle never runs callbacks itself. It pushes an event onto
//! the bus, and the bus delivers queued events one tick at a time, either
//! when the host calls [`EventBus::run_tick`]/[`EventBus::flush`] or from the
//! async dispatcher spawned by the registry.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SubscriberError;
use crate::key::{GroupName, KeySet};
use crate::registry::GroupState;

mod subscriber;

pub(crate) use subscriber::Listeners;
pub use subscriber::{Callback, SubscriptionId};

/// Independent state tracks within a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Selection,
    Filter,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Selection => "selection",
            Channel::Filter => "filter",
        }
    }

    /// Canonical form of a value on this channel.
    ///
    /// An empty selection and no selection mean the same thing, so both are
    /// stored as `None`. On the filter channel `Some(empty)` hides every row
    /// and is kept apart from `None`.
    pub fn normalize(&self, value: Option<KeySet>) -> Option<KeySet> {
        match self {
            Channel::Selection => value.filter(|keys| !keys.is_empty()),
            Channel::Filter => value,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a handle, carried by every event it originates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(Uuid);

impl HandleId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification describing one channel transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub group: GroupName,
    pub channel: Channel,
    pub value: Option<KeySet>,
    pub previous: Option<KeySet>,
    pub originator: HandleId,
    /// Position of this transition in the channel's history, starting at 1
    pub sequence: u64,
    /// Free-form data supplied by the setter
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ChangeEvent {
    /// Whether `handle` produced this event
    pub fn is_from(&self, handle: HandleId) -> bool {
        self.originator == handle
    }
}

/// A queued event together with the group it belongs to
pub(crate) struct Envelope {
    pub(crate) group: Arc<GroupState>,
    pub(crate) event: Arc<ChangeEvent>,
}

/// Outcome of one or more dispatch ticks
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Ticks that found events in the queue
    pub ticks: usize,
    /// Events taken off the queue for live groups
    pub events: usize,
    /// Callbacks that returned successfully
    pub invocations: usize,
    /// Events dropped because their group was released before delivery
    pub discarded: usize,
    pub errors: Vec<SubscriberError>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge(&mut self, other: DispatchReport) {
        self.ticks += other.ticks;
        self.events += other.events;
        self.invocations += other.invocations;
        self.discarded += other.discarded;
        self.errors.extend(other.errors);
    }
}

/// Queue of pending change events shared by every group of a registry
pub struct EventBus {
    queue: Mutex<VecDeque<Envelope>>,
    notify: Arc<Notify>,
    dispatching: Mutex<()>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Arc::new(Notify::new()),
            dispatching: Mutex::new(()),
        }
    }

    /// Queue an event for the next tick
    pub(crate) fn publish(&self, envelope: Envelope) {
        debug!(
            group = %envelope.event.group,
            channel = %envelope.event.channel,
            sequence = envelope.event.sequence,
            "change event queued"
        );
        self.queue.lock().push_back(envelope);
        self.notify.notify_one();
    }

    /// Number of events waiting for delivery
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Deliver every event queued before this call.
    ///
    /// Events published by callbacks during the tick wait for the next one.
    /// Calling this from inside a callback is a no-op.
    pub fn run_tick(&self) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(_guard) = self.dispatching.try_lock() else {
            debug!("dispatch already in progress, nested tick skipped");
            return report;
        };

        let batch: Vec<Envelope> = self.queue.lock().drain(..).collect();
        if batch.is_empty() {
            return report;
        }

        report.ticks = 1;
        for envelope in &batch {
            deliver(envelope, &mut report);
        }
        report
    }

    /// Run ticks until the queue is empty or `max_ticks` ticks have run
    pub fn flush(&self, max_ticks: usize) -> DispatchReport {
        let mut report = DispatchReport::default();
        while self.pending() > 0 {
            if report.ticks >= max_ticks {
                warn!(
                    pending = self.pending(),
                    "flush stopped after {} ticks with events still queued", max_ticks
                );
                break;
            }
            let tick = self.run_tick();
            if tick.ticks == 0 {
                break;
            }
            report.merge(tick);
        }
        report
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(envelope: &Envelope, report: &mut DispatchReport) {
    let group = &envelope.group;
    let event: &ChangeEvent = &envelope.event;
    if group.is_closed() {
        debug!(group = %event.group, channel = %event.channel, "group released, event discarded");
        report.discarded += 1;
        return;
    }

    report.events += 1;
    for listeners in group.listeners(event.channel) {
        for (subscription, callback) in listeners.snapshot() {
            let message = match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {
                    report.invocations += 1;
                    continue;
                }
                Ok(Err(err)) => format!("{:#}", err),
                Err(payload) => panic_message(payload.as_ref()),
            };

            let error = SubscriberError {
                handle: listeners.handle(),
                subscription,
                group: event.group.clone(),
                channel: event.channel,
                message,
            };
            warn!("{}", error);
            report.errors.push(error);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}
