// Route definitions

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::state::AppState;

mod api;
mod favorites;
mod saved_searches;

// Builds the `/api` router with state already applied.
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(api::health))
        .route("/users/me", get(api::current_user))
        .route("/filters", post(api::extract_filters))
        .route("/search", post(api::search))
        .route("/search/history", get(api::search_history))
        .route("/vehicles/:id", get(api::get_vehicle))
        .route("/saved-searches", post(saved_searches::create).get(saved_searches::list))
        .route("/saved-searches/:id", put(saved_searches::update).delete(saved_searches::delete))
        .route("/saved-searches/:id/run", post(saved_searches::run))
        .route("/favorites", post(favorites::add).get(favorites::list))
        .route("/favorites/:vehicle_id", delete(favorites::remove));

    Router::new().nest("/api", api_router).with_state(app_state)
}
