// Per-user favorite listings

use axum::{
    extract::{Json as JsonExtract, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use crate::{auth_middleware::AuthenticatedUser, error::AppError, state::AppState, store::is_document_id};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AddFavoriteRequest {
    vehicle_id: String,
}

pub async fn add(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    JsonExtract(request): JsonExtract<AddFavoriteRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !is_document_id(&request.vehicle_id) || app_state.vehicles.get_vehicle(&request.vehicle_id).await?.is_none() {
        return Err(AppError::NotFound("Vehicle not found".into()));
    }

    let favorite = app_state.user_data.add_favorite(&identity.user_id, &request.vehicle_id).await?;
    Ok((StatusCode::CREATED, Json(favorite)))
}

pub async fn remove(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(vehicle_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if is_document_id(&vehicle_id) && app_state.user_data.remove_favorite(&identity.user_id, &vehicle_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Favorite not found".into()))
    }
}

pub async fn list(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let vehicles = app_state.user_data.favorites(&identity.user_id).await?;
    Ok(Json(vehicles))
}
