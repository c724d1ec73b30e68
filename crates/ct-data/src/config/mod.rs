//! Shared dataset configuration

use ct_core::GroupName;
use serde::{Deserialize, Serialize};

use crate::keys::KeySource;
use crate::DataError;

/// How a host wants a table to be shared
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Group to link with; a fresh unique group is generated when absent
    pub group: Option<String>,

    /// Where row keys come from
    pub key: KeySource,
}

impl DatasetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, DataError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_key(mut self, key: KeySource) -> Self {
        self.key = key;
        self
    }

    pub(crate) fn group_name(&self) -> Option<GroupName> {
        self.group.as_deref().map(GroupName::from)
    }
}
