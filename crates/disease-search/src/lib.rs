//! # disease-search
//!
//! Query resolution for the disease normalizer.
//!
//! This crate provides:
//! - [`QueryHandler::search`]: the best-tier matches from each requested
//!   source
//! - [`QueryHandler::normalize`]: the single merged concept a query resolves
//!   to
//! - Response shapes for both, plus source filters and query warnings
//!
//! Matching is exact and case-insensitive. Tiers are checked in the order
//! concept ID, label, alias, xref, associated_with.
//!
//! ## Example
//!
//! ```rust,ignore
//! use disease_search::QueryHandler;
//!
//! let handler = QueryHandler::new(store);
//! let response = handler.search("neuroblastoma", Some("ncit,mondo"), None).await?;
//! for (source, matches) in &response.source_matches {
//!     println!("{}: {:?}", source, matches.match_type);
//! }
//!
//! let normalized = handler.normalize("NBL").await;
//! println!("{:?}", normalized.normalized_id);
//! ```

pub mod query;
pub mod response;
pub mod sources;
pub mod warnings;

// Re-export core types
pub use disease_core::*;

pub use query::QueryHandler;
pub use response::{
    Coding, ConceptMapping, Extension, MappingRelation, NamedSourceMatches, NormalizationResponse,
    NormalizedDisease, SearchListResponse, SearchResponse, ServiceMeta, SourceSearchMatches,
};
pub use sources::SourceFilter;
pub use warnings::{detect_warnings, QueryWarning};
