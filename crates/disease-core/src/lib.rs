//! # disease-core
//!
//! Core types, traits, and abstractions for the disease normalizer.
//!
//! This crate provides the record model shared by every storage backend,
//! the [`DiseaseStore`] contract those backends implement, and the error
//! taxonomy used across the workspace.

pub mod cache;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod namespaces;
pub mod traits;

// Re-export commonly used types at crate root
pub use cache::{InMemoryMetadataCache, MetadataCache, PassThroughMetadataCache};
pub use error::{Error, Result};
pub use models::*;
pub use namespaces::{implicit_concept_ids, system_uri};
pub use traits::*;
