//! Headless stand-ins for a map and a data table

use arrow::util::pretty::pretty_format_batches;
use ct_core::{Capabilities, ChangeEvent, LinkedWidget};
use ct_data::SharedDataset;
use parking_lot::RwLock;
use tracing::info;

/// Highlights selected quakes and hides filtered ones
pub struct MapWidget {
    data: SharedDataset,
    highlighted: RwLock<Vec<usize>>,
    visible: RwLock<usize>,
}

impl MapWidget {
    pub fn new(data: SharedDataset) -> Self {
        let visible = data.num_rows();
        Self {
            data,
            highlighted: RwLock::new(Vec::new()),
            visible: RwLock::new(visible),
        }
    }

    pub fn data(&self) -> &SharedDataset {
        &self.data
    }

    /// Rows currently drawn highlighted
    pub fn highlighted(&self) -> Vec<usize> {
        self.highlighted.read().clone()
    }

    pub fn visible(&self) -> usize {
        *self.visible.read()
    }
}

impl LinkedWidget for MapWidget {
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn on_selection(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        let rows = event
            .value
            .as_ref()
            .map(|keys| self.data.rows_for(keys))
            .unwrap_or_default();
        info!(rows = ?rows, "map highlights");
        *self.highlighted.write() = rows;
        Ok(())
    }

    fn on_filter(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        let visible = self.data.filter_mask(event.value.as_ref()).true_count();
        info!(visible, "map redrawn");
        *self.visible.write() = visible;
        Ok(())
    }
}

/// Shows the rows passing the filter; can select but not clear
pub struct TableWidget {
    data: SharedDataset,
    selected: RwLock<Vec<usize>>,
}

impl TableWidget {
    pub fn new(data: SharedDataset) -> Self {
        Self {
            data,
            selected: RwLock::new(Vec::new()),
        }
    }

    pub fn data(&self) -> &SharedDataset {
        &self.data
    }

    pub fn selected(&self) -> Vec<usize> {
        self.selected.read().clone()
    }
}

impl LinkedWidget for TableWidget {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_clear: false,
            ..Capabilities::all()
        }
    }

    fn on_selection(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        let rows = event
            .value
            .as_ref()
            .map(|keys| self.data.rows_for(keys))
            .unwrap_or_default();
        *self.selected.write() = rows;
        Ok(())
    }

    fn on_filter(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        let visible = self.data.filtered_table(event.value.as_ref())?;
        info!(
            "table shows {} rows\n{}",
            visible.num_rows(),
            pretty_format_batches(&[visible.clone()])?
        );
        Ok(())
    }
}
