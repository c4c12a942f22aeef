//! `list` and `search` commands

use anyhow::Result;
use colored::*;

use super::output::{Tabular, colored_badge, format_csv, format_json, format_table};
use super::{apply_view_args, load_table};
use crate::cli::{ListArgs, OutputFormat};
use crate::context::AppContext;
use crate::records::DriverSummary;
use crate::records::projector::quick_search;

pub async fn handle_list_command(ctx: &AppContext, args: ListArgs) -> Result<()> {
    let mut controller = load_table(ctx).await?;
    apply_view_args(&mut controller, &args.view)?;

    let Some(grid) = controller.grid() else {
        eprintln!("{}", "No records to show".yellow());
        return Ok(());
    };
    let table = Tabular::from_grid(grid, args.all_columns);

    match args.format {
        OutputFormat::Table => {
            print!("{}", format_table(&table));
            println!();
            println!("{}", grid.info_line().dimmed());
        }
        OutputFormat::Json => println!("{}", format_json(&table)?),
        OutputFormat::Csv => print!("{}", format_csv(&table)?),
    }
    Ok(())
}

pub async fn handle_search_command(ctx: &AppContext, term: &str) -> Result<()> {
    let records = ctx.loader.load().await?;
    let summaries: Vec<DriverSummary> = records.iter().map(DriverSummary::from_record).collect();
    let matches = quick_search(&summaries, term);

    if matches.is_empty() {
        println!("{}", format!("No driver matches '{}'", term).yellow());
        return Ok(());
    }

    for summary in &matches {
        println!(
            "{}  {}  {}  {}",
            summary.nombre_completo.bold(),
            summary.numero_documento.cyan(),
            colored_badge(&summary.estado),
            summary.nombre_inversor.dimmed()
        );
    }
    println!();
    println!(
        "{}",
        format!("{} of {} drivers", matches.len(), summaries.len()).dimmed()
    );
    Ok(())
}
