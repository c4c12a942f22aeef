//! `columns` command: order and visibility of the table columns

use anyhow::{Context, Result, bail};
use colored::*;
use dialoguer::MultiSelect;
use is_terminal::IsTerminal;

use super::{column_matches, load_table};
use crate::cli::ColumnsCommands;
use crate::context::AppContext;
use crate::table::{ColumnMeta, Effect, TableController, TableStateUpdate};

pub async fn handle_columns_command(ctx: &AppContext, command: ColumnsCommands) -> Result<()> {
    let mut controller = load_table(ctx).await?;
    if controller.columns().iter().all(|c| c.synthetic) {
        bail!("No columns available: the dataset has no displayable fields");
    }

    let effects = match command {
        ColumnsCommands::Show => Vec::new(),
        ColumnsCommands::Hide { name } => {
            let meta = find_column(&controller, &name)?;
            if meta.locked {
                bail!("Column '{}' is always visible", meta.display_name);
            }
            let name = meta.name.clone();
            controller.set_column_visible(&name, false)
        }
        ColumnsCommands::Unhide { name } => {
            let name = find_column(&controller, &name)?.name.clone();
            controller.set_column_visible(&name, true)
        }
        ColumnsCommands::Move { from, to } => {
            let count = controller.state().field_order().len();
            if from == 0 || to == 0 || from > count || to > count {
                bail!("Positions must be between 1 and {}", count);
            }
            let (from, to) = (from - 1, to - 1);
            let slot = if to > from { to + 1 } else { to };
            controller.move_column(from, slot)
        }
        ColumnsCommands::All => controller.set_all_visible(true),
        ColumnsCommands::None => controller.set_all_visible(false),
        ColumnsCommands::Reset => controller.reset_columns(),
        ColumnsCommands::Pick => pick_columns(&mut controller)?,
        ColumnsCommands::State => {
            let state = serde_json::to_string_pretty(&controller.current_state())
                .context("Failed to format table state")?;
            println!("{}", state);
            return Ok(());
        }
        ColumnsCommands::Apply { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let update: TableStateUpdate = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            controller.apply_state(update)
        }
    };

    let changed = !effects.is_empty();
    controller.apply_effects(effects).await;
    let effects = controller.flush();
    controller.apply_effects(effects).await;

    print_columns(&controller);
    if changed {
        println!("{}", "Column settings saved".green());
    }
    Ok(())
}

fn find_column<'a>(controller: &'a TableController, query: &str) -> Result<&'a ColumnMeta> {
    controller
        .columns()
        .iter()
        .filter(|meta| !meta.synthetic)
        .find(|meta| column_matches(meta, query))
        .with_context(|| format!("Unknown column '{}'", query))
}

fn pick_columns(controller: &mut TableController) -> Result<Vec<Effect>> {
    if !std::io::stdin().is_terminal() {
        bail!("Column picker needs an interactive terminal");
    }

    let columns: Vec<ColumnMeta> = controller.columns().to_vec();
    let items: Vec<String> = columns
        .iter()
        .map(|meta| {
            if meta.locked {
                format!("{} (fixed)", meta.display_name)
            } else {
                meta.display_name.clone()
            }
        })
        .collect();
    let defaults: Vec<bool> = columns
        .iter()
        .map(|meta| controller.state().is_visible(&meta.name))
        .collect();

    let chosen = MultiSelect::new()
        .with_prompt("Visible columns (space to toggle, enter to confirm)")
        .items(&items)
        .defaults(&defaults)
        .interact()
        .context("Column selection cancelled")?;

    let mut effects = Vec::new();
    for (index, meta) in columns.iter().enumerate() {
        effects.extend(controller.set_column_visible(&meta.name, chosen.contains(&index)));
    }
    Ok(effects)
}

fn print_columns(controller: &TableController) {
    let state = controller.state();
    for (position, meta) in controller.columns().iter().enumerate() {
        let mark = if state.is_visible(&meta.name) {
            "●".green()
        } else {
            "○".dimmed()
        };
        let mut line = format!(
            "{:>3}. {} {}  {}",
            position + 1,
            mark,
            meta.display_name.bold(),
            meta.name.dimmed()
        );
        if meta.locked {
            line.push_str(&format!("  {}", "fixed".cyan()));
        }
        println!("{}", line);
    }
}
