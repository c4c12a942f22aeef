use anyhow::Result;
use colored::*;

use super::{apply_view_args, load_table};
use crate::cli::ExportArgs;
use crate::context::AppContext;
use crate::export::export_view;

pub async fn handle_export_command(ctx: &AppContext, args: ExportArgs) -> Result<()> {
    let mut controller = load_table(ctx).await?;
    apply_view_args(&mut controller, &args.view)?;

    let directory = args.output.unwrap_or_else(|| ctx.config.export_dir());
    let view = controller.live_view();
    match export_view(&view, &directory, &ctx.config.table.layout, chrono::Local::now())? {
        Some(path) => println!(
            "Exported {} rows to {}",
            view.rows.len(),
            path.display().to_string().bright_green()
        ),
        None => println!("{}", "Nothing to export: no visible rows or columns".yellow()),
    }
    Ok(())
}
