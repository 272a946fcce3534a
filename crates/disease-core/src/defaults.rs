//! Centralized default constants for the disease normalizer.
//!
//! Organized by domain area. Crates reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// CONFIGURATION (environment variable names)
// =============================================================================

/// Storage backend URL (`postgres://`, `memory://`, `file://<path>`).
pub const ENV_DB_URL: &str = "DISEASE_NORM_DB_URL";

/// Deployment environment (`Dev`, `Staging`, `Prod`).
pub const ENV_DEPLOY: &str = "DISEASE_NORM_ENV";

/// Skip interactive confirmation for destructive operations.
pub const ENV_SKIP_CONFIRMATION: &str = "DISEASE_NORM_SKIP_CONFIRMATION";

/// Directory holding pre-transformed source files for the CLI loader.
pub const ENV_DATA_DIR: &str = "DISEASE_NORM_DATA_DIR";

/// Fallback storage URL when `DISEASE_NORM_DB_URL` is unset.
pub const DB_URL: &str = "postgresql://postgres@localhost:5432/disease_normalizer";

// =============================================================================
// STORAGE
// =============================================================================

/// Pending writes held by the wide-column store before an automatic flush.
pub const WRITE_BATCH_SIZE: usize = 25;

/// Page size for full-table scans and streamed record iteration.
pub const SCAN_PAGE_SIZE: usize = 500;

// =============================================================================
// ETL
// =============================================================================

/// Records carrying more distinct aliases than this have their aliases dropped.
pub const MAX_ALIASES: usize = 20;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Service name reported in response metadata.
pub const SERVICE_NAME: &str = "disease-normalizer";
