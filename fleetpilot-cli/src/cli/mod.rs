//! Command-line surface

pub mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::table::SortDirection;

#[derive(Parser)]
#[command(name = "fleetpilot")]
#[command(version, about = "FleetPilot driver registry in the terminal", long_about = None)]
pub struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the records table
    List(ListArgs),

    /// Quick search over driver names, documents, status and investor
    Search {
        /// Words that must all appear
        term: String,
    },

    /// Write the visible table to a spreadsheet
    Export(ExportArgs),

    /// Select the driver with a record id for the next interactive session
    Select {
        /// Record id or row key; omit with --clear
        record_id: Option<String>,
        /// Forget the current selection
        #[arg(long, conflicts_with = "record_id")]
        clear: bool,
    },

    /// Inspect or change column order and visibility
    #[command(subcommand)]
    Columns(ColumnsCommands),

    /// Manage the FileMaker session
    #[command(subcommand)]
    Session(SessionCommands),

    /// Interactive table (default)
    Tui,
}

#[derive(Args, Clone, Default)]
pub struct ViewArgs {
    /// Global search, every word must match a cell
    #[arg(short, long)]
    pub search: Option<String>,

    /// Sort by column, as COLUMN or COLUMN:asc|desc; repeat for more keys
    #[arg(long = "sort", value_parser = parse_sort)]
    pub sort: Vec<SortArg>,
}

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub view: ViewArgs,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Include hidden columns
    #[arg(long)]
    pub all_columns: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub view: ViewArgs,

    /// Target directory (defaults to the configured export directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum ColumnsCommands {
    /// List columns in display order
    Show,
    /// Hide a column by name or caption
    Hide { name: String },
    /// Show a hidden column by name or caption
    Unhide { name: String },
    /// Move the column at position FROM to position TO (1-based, as printed by `show`)
    Move { from: usize, to: usize },
    /// Show every column
    All,
    /// Hide every column that can be hidden
    None,
    /// Forget stored order and visibility
    Reset,
    /// Choose visible columns interactively
    Pick,
    /// Print order, visibility and sort as JSON
    State,
    /// Apply a state JSON file as printed by `state`
    Apply { file: PathBuf },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Open a session with user credentials
    Login {
        /// User name (defaults to FLEETPILOT_USER or a prompt)
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Close the session
    Logout,
    /// Show the stored session
    Status,
    /// Send a keep-alive request now
    Ping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortArg {
    pub column: String,
    pub direction: SortDirection,
}

/// `COLUMN` or `COLUMN:asc|desc`
pub fn parse_sort(value: &str) -> Result<SortArg, String> {
    let (column, direction) = match value.rsplit_once(':') {
        Some((column, dir)) => {
            let direction = match dir.trim().to_ascii_lowercase().as_str() {
                "asc" => SortDirection::Asc,
                "desc" => SortDirection::Desc,
                other => return Err(format!("unknown sort direction '{}', use asc or desc", other)),
            };
            (column, direction)
        }
        None => (value, SortDirection::Asc),
    };
    let column = column.trim();
    if column.is_empty() {
        return Err("sort column is empty".to_string());
    }
    Ok(SortArg {
        column: column.to_string(),
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort() {
        assert_eq!(
            parse_sort("matricula").unwrap(),
            SortArg { column: "matricula".into(), direction: SortDirection::Asc }
        );
        assert_eq!(parse_sort("Estado:DESC").unwrap().direction, SortDirection::Desc);
        assert!(parse_sort("estado:up").is_err());
        assert!(parse_sort(":asc").is_err());
    }

    #[test]
    fn test_cli_parses_list_flags() {
        let cli = Cli::parse_from([
            "fleetpilot", "list", "--search", "ana", "--sort", "estado:desc", "--sort", "nombre",
            "--format", "csv", "--all-columns",
        ]);
        let Some(Commands::List(args)) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.view.search.as_deref(), Some("ana"));
        assert_eq!(args.view.sort.len(), 2);
        assert_eq!(args.format, OutputFormat::Csv);
        assert!(args.all_columns);
    }

    #[test]
    fn test_cli_verify() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
