//! Application configuration
//!
//! Settings come from `<config_dir>/fleetpilot/config.toml` (every field is
//! optional) and are then overridden by `FLEETPILOT_*` environment
//! variables.

pub mod repository;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://fm.fleetpilot.local/fmi/data/vLatest/databases/FleetPilot";

pub const DEFAULT_SCRIPTS: &[&str] = &[
    "conductor.Listar",
    "Conductor.Listar",
    "conductores.Listar",
    "Conductores.Listar",
    "Script.conductor.Listar",
];

pub const DEFAULT_LAYOUTS: &[&str] = &[
    "conductor.Listar",
    "Conductor.Listar",
    "conductores",
    "Conductores",
    "conductor",
    "Conductor",
    "clientes",
    "Clientes",
    "clientes_listado",
    "Clientes_Listado",
];

/// A candidate name list as written in the config file: a single name, a
/// list, or a primary name with fallbacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidateList {
    Single(String),
    List(Vec<String>),
    Structured {
        #[serde(default)]
        primary: Option<String>,
        #[serde(default)]
        fallbacks: Vec<String>,
    },
}

impl CandidateList {
    /// Blank entries dropped, duplicates removed, first occurrence wins
    pub fn names(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            CandidateList::Single(name) => vec![name.as_str()],
            CandidateList::List(names) => names.iter().map(String::as_str).collect(),
            CandidateList::Structured { primary, fallbacks } => primary
                .iter()
                .chain(fallbacks.iter())
                .map(String::as_str)
                .collect(),
        };
        crate::table::state::sanitize_names(raw)
    }

    /// Parse a comma separated environment value
    pub fn from_env_value(value: &str) -> Self {
        CandidateList::List(value.split(',').map(str::to_string).collect())
    }
}

fn resolve_candidates(list: Option<&CandidateList>, defaults: &[&str]) -> Vec<String> {
    let names = list.map(CandidateList::names).unwrap_or_default();
    if names.is_empty() {
        defaults.iter().map(|name| name.to_string()).collect()
    } else {
        names
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub layouts: Option<CandidateList>,
    pub scripts: Option<CandidateList>,
    /// Optional `limit` sent with the record query
    pub find_limit: Option<u32>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            layouts: None,
            scripts: None,
            find_limit: None,
        }
    }
}

impl ApiConfig {
    pub fn layout_candidates(&self) -> Vec<String> {
        resolve_candidates(self.layouts.as_ref(), DEFAULT_LAYOUTS)
    }

    pub fn script_candidates(&self) -> Vec<String> {
        resolve_candidates(self.scripts.as_ref(), DEFAULT_SCRIPTS)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Layout name the view state is stored under
    pub layout: String,
    pub storage_prefix: String,
    pub selection_key: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            layout: "clientes".to_string(),
            storage_prefix: "clientesTable.state".to_string(),
            selection_key: "clientes.process-selection".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub retry_secs: u64,
    pub visibility_threshold_secs: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 9 * 60,
            retry_secs: 60,
            visibility_threshold_secs: 2 * 60,
        }
    }
}

impl KeepAliveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }

    /// Age of the last success after which regaining focus pings again
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.interval_secs.saturating_sub(self.visibility_threshold_secs))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub table: TableConfig,
    pub keep_alive: KeepAliveConfig,
    pub export: ExportConfig,
    pub database: DatabaseConfig,
}

impl Config {
    /// Load the config file (if any) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.normalize();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Apply `FLEETPILOT_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_blank("FLEETPILOT_BASE_URL") {
            self.api.base_url = url;
        }
        if let Some(layouts) = non_blank("FLEETPILOT_LAYOUTS") {
            self.api.layouts = Some(CandidateList::from_env_value(&layouts));
        }
        if let Some(scripts) = non_blank("FLEETPILOT_SCRIPTS") {
            self.api.scripts = Some(CandidateList::from_env_value(&scripts));
        }
        if let Some(path) = non_blank("FLEETPILOT_DB") {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(dir) = non_blank("FLEETPILOT_EXPORT_DIR") {
            self.export.directory = Some(PathBuf::from(dir));
        }
    }

    fn normalize(&mut self) {
        self.api.base_url = normalize_base_url(&self.api.base_url);
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("fleetpilot")
                .join("fleetpilot.db")
        })
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Log file used while the terminal UI owns the screen
    pub fn log_path(&self) -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fleetpilot")
            .join("fleetpilot.log")
    }
}

/// `<config_dir>/fleetpilot/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fleetpilot").join("config.toml"))
}

/// Trimmed base URL without trailing slashes
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
