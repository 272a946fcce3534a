//! Structured logging field name constants for the disease normalizer.
//!
//! These are the canonical names for structured `tracing` fields. Call
//! sites spell them as literals inside the macros; keep the two in step so
//! log aggregation can query by the same names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Lost data or inconsistent store state (dangling merge_ref, unresolvable record) |
//! | WARN  | Recoverable issue, fallback applied (non-driver ids, overlapping groups, nbsp queries) |
//! | INFO  | Lifecycle events, update and merge completions |
//! | DEBUG | Per-phase timings, backend choices |
//! | TRACE | Per-record iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID for an HTTP request.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "cli", "search", "db", "etl"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "merge", "wide_column", "postgres", "query", "loader"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "search", "normalize", "create_merged_concepts", "delete_source"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Concept ID being operated on.
pub const CONCEPT_ID: &str = "concept_id";

/// Source name being operated on.
pub const SOURCE: &str = "source";

/// Query text.
pub const QUERY: &str = "query";

/// Storage backend name.
pub const BACKEND: &str = "backend";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned.
pub const RESULT_COUNT: &str = "result_count";

/// Number of records written or processed.
pub const RECORD_COUNT: &str = "record_count";

/// Database table affected.
pub const DB_TABLE: &str = "db_table";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Match tier reached by a query.
pub const MATCH_TYPE: &str = "match_type";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
