//! # disease-etl
//!
//! Builds and refreshes the stored disease data.
//!
//! This crate provides:
//! - [`Merge`]: groups Mondo-driven identity records and writes merged
//!   concepts with their `merge_ref` back-pointers
//! - [`JsonLinesLoader`]: loads pre-transformed source records
//! - Update operations that reload sources and rebuild merged concepts
//!
//! ## Example
//!
//! ```rust,ignore
//! use disease_etl::{update_all_and_normalize, JsonLinesLoader};
//!
//! let loaders = JsonLinesLoader::for_all_sources("data/");
//! let summary = update_all_and_normalize(store.as_ref(), &loaders).await?;
//! println!("{} merged records", summary.merged_written);
//! ```

pub mod loader;
pub mod merge;
pub mod update;

// Re-export core types
pub use disease_core::*;

pub use loader::JsonLinesLoader;
pub use merge::{find_overlaps, merge_records, ConceptGroup, Merge, MergeSummary};
pub use update::{
    delete_normalized, delete_source, load_source, update_all_and_normalize, update_all_sources,
    update_normalized, update_source,
};
