//! Table state, grid and controller

pub mod columns;
pub mod controller;
pub mod grid;
pub mod persist;
pub mod reorder;
pub mod selection;
pub mod state;

pub use columns::{ColumnMeta, SYNTHETIC_COLUMN, build_column_meta, humanize_column_name};
pub use controller::{Effect, TableController, TableKeys};
pub use grid::{GridColumn, GridRow, GridView, LiveView};
pub use persist::storage_key;
pub use reorder::{ColumnDrag, HeaderCell};
pub use selection::{Selection, StoredSelection};
pub use state::{SortDescriptor, SortDirection, TableState, TableStateUpdate};
