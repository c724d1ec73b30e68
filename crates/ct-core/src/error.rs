//! Error types for handles and event dispatch

use thiserror::Error;

use crate::events::{Channel, HandleId, SubscriptionId};
use crate::key::GroupName;
use crate::sync::Capability;

/// A `set` payload that is neither absent nor a collection of keys
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid channel value: {reason}")]
pub struct InvalidValueError {
    pub reason: String,
}

impl InvalidValueError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors returned by handle operations
#[derive(Error, Debug)]
pub enum HandleError {
    #[error("handle {0} is not bound to a group")]
    Unbound(HandleId),

    #[error("group '{0}' was released while the handle was still bound")]
    GroupClosed(GroupName),

    #[error("widget does not support {0}")]
    Unsupported(Capability),

    #[error(transparent)]
    InvalidValue(#[from] InvalidValueError),
}

/// A callback that failed while an event was being delivered
#[derive(Error, Debug, Clone)]
#[error("subscriber {subscription} of handle {handle} failed on {channel} event for group '{group}': {message}")]
pub struct SubscriberError {
    pub handle: HandleId,
    pub subscription: SubscriptionId,
    pub group: GroupName,
    pub channel: Channel,
    pub message: String,
}
