//! Data access for the record table
//!
//! [`client::FileMakerClient`] speaks to the Data API (or its OData flavour),
//! [`fetcher::RecordFetcher`] walks the layout and script fallbacks and
//! [`normalize`] turns whatever came back into [`models::Record`]s.

pub mod client;
pub mod fetcher;
pub mod keepalive;
pub mod models;
pub mod normalize;
pub mod shared;

pub use client::{DataApi, FileMakerClient};
pub use fetcher::{Attempt, FetchCandidates, FetchError, RecordFetcher, SuccessContext};
pub use keepalive::KeepAlive;
pub use models::{ApiResponse, FindRequest, PortalRow, Record};
pub use normalize::{Normalized, PayloadSource, normalize};
pub use shared::SharedRecordLoader;
