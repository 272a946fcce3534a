//! # disease-api
//!
//! HTTP front end for the disease normalizer.
//!
//! Routes:
//! - `GET /health`
//! - `GET /disease/search?q=&incl=&excl=`
//! - `GET /disease/normalize?q=`
//!
//! The `disease-api` binary serves these routes; `disease-cli` runs the
//! administrative commands (update, check, drop, dump).

pub mod error;
pub mod routes;
pub mod telemetry;

pub use error::ApiError;
pub use routes::{router, AppState, NormalizeParams, SearchParams};
pub use telemetry::init_tracing;
