//! Core of the crosstalk linking protocol
//!
//! Widgets that render the same rows share selection and filter state
//! through named groups. Each widget binds [`Handle`]s to a group in a
//! [`Registry`], writes key sets through them, and is told about changes
//! made by the others through deferred [`ChangeEvent`]s.

pub mod error;
pub mod events;
pub mod handle;
pub mod key;
pub mod registry;
pub mod sync;

// Re-export commonly used types
pub use error::{HandleError, InvalidValueError, SubscriberError};
pub use events::{ChangeEvent, Channel, DispatchReport, EventBus, HandleId, SubscriptionId};
pub use handle::Handle;
pub use key::{key_set, key_set_from_json, GroupName, Key, KeySet};
pub use registry::{GroupState, Registry, RegistryConfig};
pub use sync::{Capabilities, Capability, LinkedWidget, WidgetLink};
