use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::analyzer::Analyzer;
use crate::cache::AnalysisCache;
use crate::db_storage::AnalysisStore;
use crate::errors::AppError;
use crate::models::{
    AnalyzeRequest, AnalyzeResponse, HistoryQuery, HistoryResponse, RiskLevel, SearchRequest,
    SearchResponse,
};

/// Shared application state.
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub storage: Arc<dyn AnalysisStore>,
    pub cache: Arc<AnalysisCache>,
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "phone-risk-api",
    }))
}

/// `POST /api/v1/analyze` — runs (or replays) a risk analysis.
///
/// Returns 201 for a freshly computed record, 200 when served from cache.
pub async fn analyze_phone(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .analyzer
        .analyze(&request.phone_number, request.deep_scan)
        .await?;

    let (status, message) = if outcome.cached {
        (StatusCode::OK, "Analysis retrieved from cache")
    } else {
        (StatusCode::CREATED, "Analysis completed")
    };

    Ok((
        status,
        Json(AnalyzeResponse {
            message: message.to_string(),
            cached: outcome.cached,
            analysis: outcome.record,
        }),
    ))
}

/// `GET /api/v1/analyses/:id` — fetches one stored analysis.
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .storage
        .load(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Analysis {} not found", id)))?;
    Ok(Json(record))
}

/// `GET /api/v1/analyses?page=&per_page=` — paginated history, newest first.
pub async fn list_analyses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, 100);

    let (analyses, total) = state.storage.list(page, per_page).await?;
    let pages = (total + per_page as i64 - 1) / per_page as i64;

    Ok(Json(HistoryResponse {
        analyses,
        total,
        pages,
        current_page: page,
    }))
}

/// `POST /api/v1/analyses/search` — filtered search over stored analyses.
pub async fn search_analyses(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let risk_level = match request.risk_level.as_deref() {
        Some(raw) => Some(RiskLevel::parse(raw).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown risk level '{}'", raw))
        })?),
        None => None,
    };

    let analyses = state
        .storage
        .search(request.phone_number.as_deref(), risk_level)
        .await?;

    Ok(Json(SearchResponse {
        count: analyses.len(),
        analyses,
    }))
}

/// `DELETE /api/v1/analyses/:id` — removes one analysis and its cache
/// entries.
pub async fn delete_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .storage
        .load(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Analysis {} not found", id)))?;

    state.storage.delete(id).await?;
    state.cache.invalidate_phone(&record.phone_number).await;

    tracing::info!("Deleted analysis {} ({})", id, record.phone_number);
    Ok(Json(json!({ "message": "Analysis deleted" })))
}

/// `DELETE /api/v1/analyses` — removes every stored analysis.
pub async fn clear_analyses(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state.storage.delete_all().await?;
    state.cache.invalidate_all();

    tracing::warn!("Cleared {} stored analyses", deleted);
    Ok(Json(json!({
        "message": format!("Deleted {} analyses", deleted),
        "deleted": deleted,
    })))
}

/// `GET /api/v1/statistics` — per-level counts over stored analyses.
pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.storage.statistics().await?;
    Ok(Json(stats))
}
