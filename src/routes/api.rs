// Handlers for search, filter extraction, history and listing lookup

use axum::{
    extract::{Json as JsonExtract, Path, Query, State},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth_middleware::AuthenticatedUser,
    error::AppError,
    models::{NewSearchHistory, SearchFilters, VehicleListing},
    state::AppState,
    store::is_document_id,
};

const DEFAULT_HISTORY_LIMIT: usize = 10;

// --- Request Structs ---

#[derive(Deserialize, Debug)]
pub struct QueryRequest {
    #[serde(default)]
    query: String,
}

#[derive(Deserialize, Debug)]
pub struct HistoryParams {
    limit: Option<String>,
}

impl HistoryParams {
    // Zero or unparsable limits fall back to the default
    fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
    }
}

// --- Response Wrappers ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    parsed_filters: SearchFilters,
    results: Vec<VehicleListing>,
    count: usize,
}

// --- API Handlers ---

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

pub async fn current_user(AuthenticatedUser(identity): AuthenticatedUser) -> impl IntoResponse {
    Json(identity)
}

pub async fn extract_filters(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    JsonExtract(request): JsonExtract<QueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(user_id = %identity.user_id, "API call: extract_filters");
    let filters = app_state.extractor.extract(&request.query).await;
    Ok(Json(filters))
}

pub async fn search(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    JsonExtract(request): JsonExtract<QueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::BadRequest("Query is required".into()));
    }
    tracing::info!(user_id = %identity.user_id, query = %query, "API call: search");

    let parsed_filters = app_state.extractor.extract(&query).await;
    let results = app_state.aggregator.search_vehicles(&parsed_filters).await;

    app_state
        .user_data
        .record_search(NewSearchHistory {
            user_id: identity.user_id.clone(),
            query: query.clone(),
            parsed_filters: parsed_filters.clone(),
            result_count: results.len(),
        })
        .await
        .map_err(|e| AppError::SearchFailed(anyhow::Error::new(e).context("Failed to record search history")))?;

    tracing::info!(user_id = %identity.user_id, count = results.len(), "Search complete");
    Ok(Json(SearchResponse {
        query,
        parsed_filters,
        count: results.len(),
        results,
    }))
}

pub async fn search_history(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit();
    let history = app_state.user_data.search_history(&identity.user_id, limit).await?;
    Ok(Json(history))
}

pub async fn get_vehicle(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !is_document_id(&id) {
        return Err(AppError::NotFound("Vehicle not found".into()));
    }
    match app_state.vehicles.get_vehicle(&id).await? {
        Some(vehicle) => Ok(Json(vehicle)),
        None => Err(AppError::NotFound("Vehicle not found".into())),
    }
}
