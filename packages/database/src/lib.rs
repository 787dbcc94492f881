#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Artifact locations and the queryable `DuckDB` store.
//!
//! [`paths`] names every file the pipeline reads or writes. [`store`]
//! materializes the intersection tables into `DuckDB` and answers the
//! read-only queries the dashboard needs. [`export`] writes the flat CSV
//! tables.

pub mod export;
pub mod paths;
pub mod store;

pub use export::{write_csv, write_municipality_csvs, write_ring_csvs};
pub use paths::PipelinePaths;
pub use store::{QueryFilter, Store, StoreInput, StoreSummary, build_store};

/// Errors that can occur while writing or reading the store.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Geometry serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store has not been built yet.
    #[error("store not found at {path}; run the store stage first")]
    MissingStore {
        /// Expected store location.
        path: std::path::PathBuf,
    },

    /// A value could not be converted for storage.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of the conversion failure.
        message: String,
    },
}
