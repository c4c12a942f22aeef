//! Field aliases, active-flag filtering and row projection

pub mod active;
pub mod aliases;
pub mod projector;

pub use active::{filter_active, is_record_active};
pub use projector::{DriverSummary, ProjectedRow, StatusBadge, StatusCategory, project};
