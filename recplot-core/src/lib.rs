//! Recplot Core Library
//!
//! Reference catalog, alignment parsers, SQLite sample store and
//! recruitment-matrix construction for MAG recruitment plots.

pub mod types;
pub mod db;
pub mod catalog;
pub mod io;
pub mod store;
pub mod matrix;

// Re-export commonly used types and functions
pub use types::{ContigId, GenomicPos, MagId, NormalizedHit, Sample};
pub use catalog::{Catalog, CatalogError};
pub use io::{AlignmentFormat, ParseError, ParseSummary};
pub use io as formats;
pub use store::{IngestReport, SampleStore, StoreConfig, StoreError};
pub use matrix::{fill, BinParams, MatrixError, RecruitmentMatrix};

/// Version information for the recplot core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
