//! # disease-db
//!
//! Storage backends for the disease normalizer.
//!
//! This crate provides:
//! - [`PgDiseaseStore`]: normalized PostgreSQL tables joined by a
//!   materialized lookup view
//! - [`WideColumnStore`]: a single composite-key table with source and
//!   item-type indexes, in memory or persisted to a snapshot file
//! - Connection pool management
//! - [`DropGuard`] for protected destructive operations
//! - [`create_store`], which selects a backend from a URL
//!
//! ## Example
//!
//! ```rust,ignore
//! use disease_db::{create_store, StoreContext};
//!
//! #[tokio::main]
//! async fn main() -> disease_core::Result<()> {
//!     let store = create_store(Some("memory://"), StoreContext::default()).await?;
//!     println!("using {}", store.backend_name());
//!     Ok(())
//! }
//! ```

pub mod guard;
pub mod pool;
pub mod postgres;
pub mod wide_column;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use the shared records
pub mod test_fixtures;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

// Re-export core types
pub use disease_core::*;

pub use guard::{Confirmer, DenyConfirmer, DeployEnv, DropGuard};
pub use pool::{create_pool, log_pool_metrics, PoolConfig};
pub use postgres::PgDiseaseStore;
pub use wide_column::WideColumnStore;

/// Configuration threaded into store constructors.
#[derive(Debug, Clone, Default)]
pub struct StoreContext {
    pub drop_guard: DropGuard,
    pub pool: PoolConfig,
}

impl StoreContext {
    /// Read the drop guard and pool settings from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            drop_guard: DropGuard::from_env()?,
            pool: PoolConfig::from_env()?,
        })
    }

    pub fn with_drop_guard(mut self, drop_guard: DropGuard) -> Self {
        self.drop_guard = drop_guard;
        self
    }
}

/// Backend selected by a store URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUrl {
    Postgres(String),
    Memory,
    File(PathBuf),
}

impl StoreUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(StoreUrl::Postgres(url.to_string()))
        } else if url == "memory://" || url == "memory" {
            Ok(StoreUrl::Memory)
        } else if let Some(path) = url.strip_prefix("file://") {
            if path.is_empty() {
                return Err(Error::Config("file:// URL needs a snapshot path".to_string()));
            }
            Ok(StoreUrl::File(PathBuf::from(path)))
        } else {
            Err(Error::Config(format!(
                "unsupported store URL {:?}; expected postgres://, postgresql://, memory://, or file://",
                url
            )))
        }
    }
}

/// The configured store URL: `url` if given, else `DISEASE_NORM_DB_URL`,
/// else the local PostgreSQL default.
pub fn resolve_db_url(url: Option<&str>) -> String {
    match url {
        Some(u) if !u.trim().is_empty() => u.to_string(),
        _ => std::env::var(defaults::ENV_DB_URL).unwrap_or_else(|_| defaults::DB_URL.to_string()),
    }
}

/// Open the store a URL names and make sure its schema exists.
pub async fn create_store(url: Option<&str>, context: StoreContext) -> Result<Arc<dyn DiseaseStore>> {
    let url = resolve_db_url(url);
    let store: Arc<dyn DiseaseStore> = match StoreUrl::parse(&url)? {
        StoreUrl::Postgres(conn) => Arc::new(PgDiseaseStore::connect(&conn, context).await?),
        StoreUrl::Memory => Arc::new(WideColumnStore::in_memory(context.drop_guard)),
        StoreUrl::File(path) => Arc::new(WideColumnStore::open(path, context.drop_guard).await?),
    };
    store.initialize_db().await?;
    info!(
        subsystem = "db",
        component = "factory",
        backend = store.backend_name(),
        "Storage backend ready"
    );
    Ok(store)
}
