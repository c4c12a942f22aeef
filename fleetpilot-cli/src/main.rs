mod api;
mod auth;
mod cli;
mod config;
mod context;
mod events;
mod export;
mod records;
mod table;
mod tui;

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use is_terminal::IsTerminal;

use cli::commands::{columns, export as export_cmd, list, select, session};
use cli::{Cli, Commands};
use config::Config;
use context::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load()?;
    let command = cli.command.unwrap_or(Commands::Tui);
    let interactive = matches!(command, Commands::Tui);

    init_logging(cli.verbose, interactive.then(|| config.log_path()).as_deref())?;

    if cli.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    log::debug!("Using server {}", config.api.base_url);
    let ctx = AppContext::init(config).await?;

    match command {
        Commands::List(args) => list::handle_list_command(&ctx, args).await,
        Commands::Search { term } => list::handle_search_command(&ctx, &term).await,
        Commands::Export(args) => export_cmd::handle_export_command(&ctx, args).await,
        Commands::Select { record_id, clear } => {
            select::handle_select_command(&ctx, record_id.as_deref(), clear).await
        }
        Commands::Columns(command) => columns::handle_columns_command(&ctx, command).await,
        Commands::Session(command) => session::handle_session_command(&ctx, command).await,
        Commands::Tui => {
            if !std::io::stdout().is_terminal() {
                bail!("The interactive table needs a terminal. Use 'fleetpilot list' instead.");
            }
            tui::run(ctx).await
        }
    }
}

/// `info` by default, `debug` with `--verbose`; `RUST_LOG` wins when set.
/// With a log file the terminal stays clean for the UI.
fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default));

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}
