//! Non-fatal query warnings.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Something unusual about a query that did not stop it from running.
///
/// Serialized as a single-key object, e.g.
/// `{"nbsp": "Query contains non breaking space characters."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryWarning {
    #[serde(rename = "nbsp")]
    NonBreakingSpace(String),
}

impl QueryWarning {
    pub fn non_breaking_space() -> Self {
        QueryWarning::NonBreakingSpace("Query contains non breaking space characters.".to_string())
    }
}

fn nbsp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\x{a0}|&nbsp;").expect("static pattern"))
}

/// Warnings for a raw (untrimmed) query.
pub fn detect_warnings(query: &str) -> Vec<QueryWarning> {
    let mut warnings = Vec::new();
    if nbsp_pattern().is_match(query) {
        warn!(
            subsystem = "search",
            component = "query",
            query = %query,
            "Query contains non breaking space characters"
        );
        warnings.push(QueryWarning::non_breaking_space());
    }
    warnings
}
