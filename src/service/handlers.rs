//! HTTP API Request Handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::TrilaneError;
use crate::retrieval::{HybridSearcher, SearchHit, SearchQuery, TenantFilter};
use crate::store::VectorStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub searcher: HybridSearcher,
    pub store: Arc<dyn VectorStore>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Error taxonomy translated to a status code and `{"detail": ...}`
pub struct ApiError(pub TrilaneError);

impl From<TrilaneError> for ApiError {
    fn from(e: TrilaneError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                detail: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// GET /api/search?query=...&user_id=...
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let text = params.query.unwrap_or_default();
    info!(
        %request_id,
        "Received search request: query='{}', user_id={:?}", text, params.user_id
    );

    let query = SearchQuery {
        text,
        tenant: TenantFilter::from_option(params.user_id),
        prefetch_limit: None,
        final_limit: None,
    };
    let result = state.searcher.search(&query).await?;

    Ok(Json(SearchResponse {
        results: result.results,
    }))
}

/// GET /health; probes storage only, never the embedding models
pub async fn health(State(state): State<AppState>) -> Response {
    match state.store.health().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "OK".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    detail: format!("Service Unavailable: {}", e),
                }),
            )
                .into_response()
        }
    }
}
