//! Shared datasets
//!
//! A [`SharedDataset`] is what a host hands to widgets: the table, one key
//! per row, and the name of the group the widgets should link through. The
//! dataset only names its group; the group's state lives in a
//! [`Registry`] and exists while handles are bound to it.

use arrow::array::BooleanArray;
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;
use ct_core::{Channel, GroupName, Handle, Key, KeySet, Registry};
use indexmap::IndexSet;
use tracing::debug;

use crate::config::DatasetConfig;
use crate::keys::{assign_keys, KeyError, KeySource};
use crate::DataError;

/// A table, its row keys, and its group
#[derive(Debug, Clone)]
pub struct SharedDataset {
    table: RecordBatch,
    keys: IndexSet<Key>,
    group: GroupName,
}

impl SharedDataset {
    /// Create a dataset from a host configuration
    pub fn new(table: RecordBatch, config: &DatasetConfig) -> Result<Self, DataError> {
        Ok(Self::from_parts(table, &config.key, config.group_name())?)
    }

    /// Like [`SharedDataset::new`], naming a missing group with the
    /// registry's configured prefix
    pub fn new_in(
        registry: &Registry,
        table: RecordBatch,
        config: &DatasetConfig,
    ) -> Result<Self, DataError> {
        let group = config
            .group_name()
            .unwrap_or_else(|| registry.generate_group_name());
        Ok(Self::from_parts(table, &config.key, Some(group))?)
    }

    /// Create a dataset, generating an isolated group when none is given
    pub fn from_parts(
        table: RecordBatch,
        key: &KeySource,
        group: Option<GroupName>,
    ) -> Result<Self, KeyError> {
        let keys = assign_keys(&table, key)?;
        let group = group.unwrap_or_else(GroupName::generate);
        debug!(group = %group, rows = keys.len(), "shared dataset created");

        Ok(Self {
            table,
            keys: keys.into_iter().collect(),
            group,
        })
    }

    pub fn table(&self) -> &RecordBatch {
        &self.table
    }

    /// Row keys in row order
    pub fn keys(&self) -> &IndexSet<Key> {
        &self.keys
    }

    pub fn group(&self) -> &GroupName {
        &self.group
    }

    pub fn num_rows(&self) -> usize {
        self.keys.len()
    }

    /// Key of a row
    pub fn key(&self, row: usize) -> Option<&Key> {
        self.keys.get_index(row)
    }

    /// Row holding a key
    pub fn row_of(&self, key: &str) -> Option<usize> {
        self.keys.get_index_of(key)
    }

    /// Rows whose keys are in `keys`, ascending. Keys this dataset does not
    /// have are ignored.
    pub fn rows_for(&self, keys: &KeySet) -> Vec<usize> {
        let mut rows: Vec<usize> = keys
            .iter()
            .filter_map(|key| self.keys.get_index_of(key))
            .collect();
        rows.sort_unstable();
        rows
    }

    /// Per-row flags for a selection; no selection marks nothing
    pub fn selection_mask(&self, selection: Option<&KeySet>) -> BooleanArray {
        self.mask(selection, false)
    }

    /// Per-row visibility for a filter; no filter shows everything
    pub fn filter_mask(&self, filter: Option<&KeySet>) -> BooleanArray {
        self.mask(filter, true)
    }

    /// The rows left visible by a filter
    pub fn filtered_table(&self, filter: Option<&KeySet>) -> Result<RecordBatch, DataError> {
        if filter.is_none() {
            return Ok(self.table.clone());
        }
        Ok(filter_record_batch(&self.table, &self.filter_mask(filter))?)
    }

    /// The rows in a selection
    pub fn selected_table(&self, selection: Option<&KeySet>) -> Result<RecordBatch, DataError> {
        Ok(filter_record_batch(&self.table, &self.selection_mask(selection))?)
    }

    /// Bind a handle on this dataset's group
    pub fn bind(&self, registry: &Registry, channel: Channel, owner: &str) -> Handle {
        registry.bind(Some(&self.group), channel, Some(owner))
    }

    fn mask(&self, keys: Option<&KeySet>, when_absent: bool) -> BooleanArray {
        let flags: Vec<bool> = match keys {
            None => vec![when_absent; self.keys.len()],
            Some(keys) => self.keys.iter().map(|key| keys.contains(key)).collect(),
        };
        BooleanArray::from(flags)
    }
}
