use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::HandleError;
use crate::events::{ChangeEvent, Channel};
use crate::handle::Handle;
use crate::key::{GroupName, KeySet};
use crate::registry::Registry;

/// One thing a widget may be able to do with linked state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Select,
    Filter,
    Clear,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Select => "selection",
            Capability::Filter => "filtering",
            Capability::Clear => "clearing",
        };
        f.write_str(name)
    }
}

/// What a widget declares it can take part in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Can show and produce selections
    pub can_select: bool,

    /// Can hide rows outside a filter and produce filters
    pub can_filter: bool,

    /// Can be asked to drop its selection or filter
    pub can_clear: bool,
}

impl Capabilities {
    pub const fn all() -> Self {
        Self {
            can_select: true,
            can_filter: true,
            can_clear: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            can_select: false,
            can_filter: false,
            can_clear: false,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Select => self.can_select,
            Capability::Filter => self.can_filter,
            Capability::Clear => self.can_clear,
        }
    }

    fn require(&self, capability: Capability) -> Result<(), HandleError> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(HandleError::Unsupported(capability))
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// A widget that renders linked selection and filter state.
///
/// Only changes made by other participants are forwarded; the widget's own
/// writes are not echoed back to it.
pub trait LinkedWidget: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    fn on_selection(&self, _event: &ChangeEvent) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_filter(&self, _event: &ChangeEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A widget wired into a group, with one handle per channel it supports
pub struct WidgetLink {
    capabilities: Capabilities,
    selection: Option<Handle>,
    filter: Option<Handle>,
}

impl WidgetLink {
    /// Bind `widget` to `group` on the channels its capabilities allow
    pub fn attach(
        registry: &Registry,
        group: &GroupName,
        owner: &str,
        widget: &Arc<dyn LinkedWidget>,
    ) -> Self {
        let capabilities = widget.capabilities();

        let selection = capabilities.can_select.then(|| {
            let handle = registry.bind(Some(group), Channel::Selection, Some(owner));
            forward(&handle, Arc::downgrade(widget), |w, e| w.on_selection(e));
            handle
        });
        let filter = capabilities.can_filter.then(|| {
            let handle = registry.bind(Some(group), Channel::Filter, Some(owner));
            forward(&handle, Arc::downgrade(widget), |w, e| w.on_filter(e));
            handle
        });

        tracing::debug!(
            owner,
            group = %group,
            select = capabilities.can_select,
            filter = capabilities.can_filter,
            "widget linked"
        );

        Self {
            capabilities,
            selection,
            filter,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn selection_handle(&self) -> Option<&Handle> {
        self.selection.as_ref()
    }

    pub fn filter_handle(&self) -> Option<&Handle> {
        self.filter.as_ref()
    }

    /// Current selection, if the widget takes part in selection
    pub fn selection(&self) -> Option<KeySet> {
        self.selection.as_ref().and_then(Handle::get)
    }

    /// Current filter, if the widget takes part in filtering
    pub fn filter(&self) -> Option<KeySet> {
        self.filter.as_ref().and_then(Handle::get)
    }

    pub fn select(&self, keys: KeySet) -> Result<(), HandleError> {
        self.handle(Capability::Select)?.set(Some(keys))
    }

    pub fn apply_filter(&self, keys: KeySet) -> Result<(), HandleError> {
        self.handle(Capability::Filter)?.set(Some(keys))
    }

    pub fn clear_selection(&self) -> Result<(), HandleError> {
        self.capabilities.require(Capability::Clear)?;
        self.handle(Capability::Select)?.clear()
    }

    pub fn clear_filter(&self) -> Result<(), HandleError> {
        self.capabilities.require(Capability::Clear)?;
        self.handle(Capability::Filter)?.clear()
    }

    /// Move both handles to another group
    pub fn set_group(&mut self, group: &GroupName) {
        for handle in self.selection.iter_mut().chain(self.filter.iter_mut()) {
            handle.set_group(Some(group));
        }
    }

    fn handle(&self, capability: Capability) -> Result<&Handle, HandleError> {
        self.capabilities.require(capability)?;
        let handle = match capability {
            Capability::Select => self.selection.as_ref(),
            Capability::Filter => self.filter.as_ref(),
            Capability::Clear => None,
        };
        handle.ok_or(HandleError::Unsupported(capability))
    }
}

fn forward<F>(handle: &Handle, widget: Weak<dyn LinkedWidget>, apply: F)
where
    F: Fn(&dyn LinkedWidget, &ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let own = handle.id();
    handle.on(move |event| {
        if event.is_from(own) {
            return Ok(());
        }
        match widget.upgrade() {
            Some(widget) => apply(widget.as_ref(), event),
            None => Ok(()),
        }
    });
}
