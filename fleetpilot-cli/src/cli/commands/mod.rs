pub mod columns;
pub mod export;
pub mod list;
pub mod output;
pub mod select;
pub mod session;

use anyhow::{Context, Result, bail};

use super::ViewArgs;
use crate::context::AppContext;
use crate::records::aliases::{normalize_column_name, normalize_search_text};
use crate::table::{ColumnMeta, GridView, TableController};

/// Fetch records and render them into a controller, with stored state applied
pub async fn load_table(ctx: &AppContext) -> Result<TableController> {
    if !ctx.session.has_session() {
        log::warn!("No stored session, the server may reject the request");
    }
    let mut controller = ctx.table_controller().await;
    let generation = controller.begin_load();
    let records = ctx
        .loader
        .load()
        .await
        .context("Failed to load records")?;
    let effects = controller.render(generation, records).unwrap_or_default();
    controller.apply_effects(effects).await;
    Ok(controller)
}

/// Apply `--search` and `--sort` to the loaded grid
pub fn apply_view_args(controller: &mut TableController, args: &ViewArgs) -> Result<()> {
    let Some(grid) = controller.grid_mut() else {
        return Ok(());
    };
    if !args.sort.is_empty() {
        let mut order = Vec::new();
        for sort in &args.sort {
            let Some(index) = find_grid_column(grid, &sort.column) else {
                bail!("Unknown column '{}'", sort.column);
            };
            order.push((index, sort.direction));
        }
        grid.set_order(order);
    }
    if let Some(term) = &args.search {
        grid.search(term);
    }
    Ok(())
}

/// Whether `query` names the column, by raw name, normalized name or caption
pub fn column_matches(meta: &ColumnMeta, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return false;
    }
    meta.name == query
        || normalize_column_name(&meta.name) == normalize_column_name(query)
        || normalize_search_text(&meta.display_name) == normalize_search_text(query)
}

fn find_grid_column(grid: &GridView, query: &str) -> Option<usize> {
    grid.columns()
        .iter()
        .position(|column| column_matches(&column.meta, query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::build_column_meta;

    #[test]
    fn test_column_matches_by_name_or_caption() {
        let meta = build_column_meta(&["Conductor::nDocumentoIdentidad".to_string()]);
        let meta = &meta[0];
        assert!(column_matches(meta, "Conductor::nDocumentoIdentidad"));
        assert!(column_matches(meta, "ndocumentoidentidad"));
        assert!(column_matches(meta, "número de documento de identidad"));
        assert!(!column_matches(meta, "documento"));
        assert!(!column_matches(meta, " "));
    }
}
