use anyhow::{Result, bail};
use colored::*;

use super::load_table;
use crate::context::AppContext;
use crate::table::Effect;

pub async fn handle_select_command(
    ctx: &AppContext,
    record_id: Option<&str>,
    clear: bool,
) -> Result<()> {
    let mut controller = load_table(ctx).await?;

    if clear {
        controller.clear_selection();
        // Also drops a stored snapshot that matched no current row
        controller.apply_effects(vec![Effect::ClearSelection]).await;
        println!("{}", "Selection cleared".green());
        return Ok(());
    }

    let Some(record_id) = record_id else {
        match controller.selected_row() {
            Some(row) => println!(
                "Selected: {} ({})",
                row.summary.nombre_completo.bold(),
                row.record_key.dimmed()
            ),
            None => println!("{}", "Nothing selected".yellow()),
        }
        return Ok(());
    };

    let Some(effects) = controller.select_by_record_id(record_id) else {
        bail!("No active record with id '{}'", record_id);
    };
    controller.apply_effects(effects).await;
    if let Some(row) = controller.selected_row() {
        println!("Selected {}", row.summary.nombre_completo.bright_green().bold());
    }
    Ok(())
}
