//! Demo: a map and a table linked through one group

use std::sync::Arc;
use anyhow::Result;
use tracing::{info, warn};

use ct_core::{key_set, LinkedWidget, Registry, WidgetLink};
use ct_data::{DatasetConfig, KeySource, SharedDataset};

mod demo;
mod widgets;

use widgets::{MapWidget, TableWidget};

/// Let the dispatcher deliver everything queued so far
async fn settle(registry: &Registry) {
    while registry.pending_events() > 0 {
        tokio::task::yield_now().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting crosstalk demo");

    let registry = Registry::new();
    let quakes = demo::quakes()?;

    // Both datasets name the same group, so their widgets are linked
    let map_config = DatasetConfig::new()
        .with_group("quakes")
        .with_key(KeySource::Column("id".to_string()));
    let table_config = DatasetConfig::from_json(r#"{"group": "quakes", "key": {"column": "id"}}"#)?;

    let map = Arc::new(MapWidget::new(SharedDataset::new(quakes.clone(), &map_config)?));
    let table = Arc::new(TableWidget::new(SharedDataset::new(quakes, &table_config)?));

    let map_widget: Arc<dyn LinkedWidget> = map.clone();
    let table_widget: Arc<dyn LinkedWidget> = table.clone();
    let map_link = WidgetLink::attach(&registry, map.data().group(), "map", &map_widget);
    let table_link = WidgetLink::attach(&registry, table.data().group(), "table", &table_widget);

    let dispatcher = registry.spawn_dispatcher();

    map_link.select(key_set(demo::strong_quakes(4.8)))?;
    settle(&registry).await;
    info!(rows = ?table.selected(), "table selection after map brush");

    table_link.apply_filter(key_set(["1", "2", "4", "5"]))?;
    settle(&registry).await;
    info!(visible = map.visible(), "map after table filter");

    if let Err(err) = table_link.clear_selection() {
        warn!("{}", err);
    }
    map_link.clear_selection()?;
    map_link.clear_filter()?;
    settle(&registry).await;
    info!(
        highlighted = ?map.highlighted(),
        selected = ?table.selected(),
        visible = map.visible(),
        "state after clearing"
    );

    drop(map_link);
    drop(table_link);
    drop(registry);
    dispatcher.await?;

    Ok(())
}
