//! Route table and handlers.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use disease_search::{NormalizationResponse, QueryHandler, SearchResponse};

use crate::error::ApiError;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: QueryHandler,
}

impl AppState {
    pub fn new(handler: QueryHandler) -> Self {
        Self { handler }
    }
}

/// Query string for `/disease/search`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    /// Comma-separated sources to include.
    pub incl: Option<String>,
    /// Comma-separated sources to exclude.
    pub excl: Option<String>,
}

/// Query string for `/disease/normalize`.
#[derive(Debug, Deserialize)]
pub struct NormalizeParams {
    pub q: String,
}

/// Time-ordered UUIDv7 request IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/disease/search", get(search))
        .route("/disease/normalize", get(normalize))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.handler.store().backend_name(),
    }))
}

/// Best-tier matches per source. Unknown source names, or both `incl` and
/// `excl`, are rejected with 422.
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let response = state
        .handler
        .search(&params.q, params.incl.as_deref(), params.excl.as_deref())
        .await?;
    Ok(Json(response))
}

async fn normalize(
    State(state): State<AppState>,
    Query(params): Query<NormalizeParams>,
) -> Json<NormalizationResponse> {
    Json(state.handler.normalize(&params.q).await)
}
