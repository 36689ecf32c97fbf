//! Shop catalog and board cell commands.

use tracing::info;

use super::CliSession;

/// List shops, optionally limited to one category.
pub async fn shops(session: &CliSession, category: Option<&str>) {
    let shops = match category {
        Some(category) => session.shops().load_shops_by_category(category).await,
        None => session.shops().load_shops().await,
    };

    for shop in &shops {
        info!(
            category = %shop.category,
            discount = %shop.discount_text,
            "{}",
            shop.name
        );
    }
    info!(count = shops.len(), "Shops listed");
}

/// Show the configuration of each cell in `indices`.
pub async fn cells(session: &CliSession, indices: &[u32]) {
    for &index in indices {
        let cell = session.cells().get_cell_config(index).await;
        info!(
            index = cell.index,
            kind = cell.cell_type.label(),
            category = cell.shop_category.as_deref().unwrap_or("-"),
            event = ?cell.special_event,
            param = ?cell.event_param,
            "{}",
            cell.name
        );
    }

    if !session.cells().is_table_loaded() {
        info!("Configuration table unavailable; cells were synthesized");
    }
}
