// Shared application state handed to every handler

use axum::extract::FromRef;
use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::auth_middleware::IdentityResolver;
use crate::extractor::FilterExtractor;
use crate::store::{UserDataStore, VehicleStore};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub extractor: Arc<FilterExtractor>,
    pub aggregator: Arc<Aggregator>,
    pub vehicles: Arc<dyn VehicleStore>,
    pub user_data: Arc<dyn UserDataStore>,
    pub identity: Arc<dyn IdentityResolver>,
}
