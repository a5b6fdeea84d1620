// Saved search CRUD plus re-running a stored search

use axum::{
    extract::{Json as JsonExtract, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    auth_middleware::AuthenticatedUser,
    error::AppError,
    models::{NewSavedSearch, SavedSearch, SavedSearchUpdate, SearchFilters, VehicleListing},
    state::AppState,
    store::is_document_id,
};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateSavedSearchRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    query: String,
    parsed_filters: Option<SearchFilters>,
    alerts_enabled: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse {
    saved_search: SavedSearch,
    results: Vec<VehicleListing>,
    count: usize,
}

fn not_found() -> AppError {
    AppError::NotFound("Saved search not found".into())
}

fn checked_id(id: &str) -> Result<&str, AppError> {
    if is_document_id(id) {
        Ok(id)
    } else {
        Err(not_found())
    }
}

pub async fn create(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    JsonExtract(request): JsonExtract<CreateSavedSearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = request.name.trim().to_string();
    let query = request.query.trim().to_string();
    if name.is_empty() || query.is_empty() {
        return Err(AppError::BadRequest("Name and query are required".into()));
    }

    let parsed_filters = match request.parsed_filters {
        Some(filters) => filters,
        None => app_state.extractor.extract(&query).await,
    };

    let saved = app_state
        .user_data
        .create_saved_search(NewSavedSearch {
            user_id: identity.user_id,
            name,
            query,
            parsed_filters,
            alerts_enabled: request.alerts_enabled.unwrap_or(false),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn list(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let searches = app_state.user_data.saved_searches(&identity.user_id).await?;
    Ok(Json(searches))
}

pub async fn update(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<String>,
    JsonExtract(mut update): JsonExtract<SavedSearchUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let id = checked_id(&id)?;
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty())
        || update.query.as_deref().is_some_and(|q| q.trim().is_empty())
    {
        return Err(AppError::BadRequest("Name and query cannot be blank".into()));
    }

    // A new query without explicit filters gets fresh filters
    if update.parsed_filters.is_none() {
        if let Some(query) = &update.query {
            update.parsed_filters = Some(app_state.extractor.extract(query).await);
        }
    }

    app_state
        .user_data
        .update_saved_search(&identity.user_id, id, update)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn delete(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = checked_id(&id)?;
    if app_state.user_data.delete_saved_search(&identity.user_id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found())
    }
}

pub async fn run(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = checked_id(&id)?;
    let saved = app_state
        .user_data
        .get_saved_search(&identity.user_id, id)
        .await?
        .ok_or_else(not_found)?;

    tracing::info!(user_id = %identity.user_id, saved_search = %saved.id, "Running saved search");
    let results = app_state.aggregator.search_vehicles(&saved.parsed_filters).await;

    let stamp = SavedSearchUpdate { last_run_at: Some(Utc::now()), ..Default::default() };
    let saved_search = app_state
        .user_data
        .update_saved_search(&identity.user_id, id, stamp)
        .await
        .map_err(|e| AppError::SearchFailed(anyhow::Error::new(e).context("Failed to stamp saved search")))?
        .ok_or_else(not_found)?;

    Ok(Json(RunResponse { saved_search, count: results.len(), results }))
}
