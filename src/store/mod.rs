// Persistence seams for listings and per-user data

use async_trait::async_trait;

use crate::models::{
    Favorite, NewSavedSearch, NewSearchHistory, NewVehicle, SavedSearch, SavedSearchUpdate,
    SearchFilters, SearchHistoryRecord, VehicleListing,
};

mod firestore;
mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // A listing with the same (source, external id) already exists.
    #[error("listing {marketplace}/{external_id} already exists")]
    Conflict { marketplace: String, external_id: String },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("malformed stored record: {0}")]
    Corrupt(String),

    #[error("invalid document id '{0}'")]
    InvalidId(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// Ids taken from request paths must name exactly one document
pub fn is_document_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains('/')
}

// Text fields match as case-insensitive substrings; source and external_id exactly
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleQuery {
    pub make: Option<String>,
    pub model: Option<String>,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub max_price: Option<f64>,
    pub damage_type: Option<String>,
    pub location: Option<String>,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub limit: usize,
}

impl VehicleQuery {
    pub fn from_filters(filters: &SearchFilters, limit: usize) -> Self {
        Self {
            make: filters.make.clone(),
            model: filters.model.clone(),
            min_year: filters.min_year,
            max_year: filters.max_year,
            max_price: filters.max_price,
            damage_type: filters.damage_type.clone(),
            location: filters.location.clone(),
            source: None,
            external_id: None,
            limit,
        }
    }

    pub fn by_external_id(source: &str, external_id: &str) -> Self {
        Self {
            make: None,
            model: None,
            min_year: None,
            max_year: None,
            max_price: None,
            damage_type: None,
            location: None,
            source: Some(source.to_string()),
            external_id: Some(external_id.to_string()),
            limit: 1,
        }
    }

    pub fn matches(&self, vehicle: &VehicleListing) -> bool {
        fn contains(haystack: Option<&str>, needle: &Option<String>) -> bool {
            match needle {
                None => true,
                Some(n) => haystack.is_some_and(|h| h.to_lowercase().contains(&n.to_lowercase())),
            }
        }

        vehicle.is_active
            && contains(Some(&vehicle.make), &self.make)
            && contains(Some(&vehicle.model), &self.model)
            && self.min_year.is_none_or(|y| vehicle.year >= y)
            && self.max_year.is_none_or(|y| vehicle.year <= y)
            // no bid means the price constraint cannot be satisfied
            && self
                .max_price
                .is_none_or(|p| vehicle.current_bid.is_some_and(|bid| bid <= p))
            && contains(vehicle.damage_type.map(|d| d.as_str()), &self.damage_type)
            && contains(vehicle.location.as_deref(), &self.location)
            && self.source.as_ref().is_none_or(|s| *s == vehicle.source)
            && self.external_id.as_ref().is_none_or(|id| *id == vehicle.external_id)
    }
}

#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn query_vehicles(&self, query: &VehicleQuery) -> StoreResult<Vec<VehicleListing>>;

    // Conflict when (source, external id) is taken
    async fn insert_vehicle(&self, vehicle: NewVehicle) -> StoreResult<VehicleListing>;

    async fn get_vehicle(&self, id: &str) -> StoreResult<Option<VehicleListing>>;
}

// Search history, saved searches and favorites, all scoped to one user.
#[async_trait]
pub trait UserDataStore: Send + Sync {
    async fn record_search(&self, record: NewSearchHistory) -> StoreResult<SearchHistoryRecord>;

    async fn search_history(&self, user_id: &str, limit: usize) -> StoreResult<Vec<SearchHistoryRecord>>;

    async fn create_saved_search(&self, search: NewSavedSearch) -> StoreResult<SavedSearch>;

    async fn saved_searches(&self, user_id: &str) -> StoreResult<Vec<SavedSearch>>;

    async fn get_saved_search(&self, user_id: &str, id: &str) -> StoreResult<Option<SavedSearch>>;

    async fn update_saved_search(
        &self,
        user_id: &str,
        id: &str,
        update: SavedSearchUpdate,
    ) -> StoreResult<Option<SavedSearch>>;

    async fn delete_saved_search(&self, user_id: &str, id: &str) -> StoreResult<bool>;

    // Idempotent: favoriting twice keeps the first timestamp.
    async fn add_favorite(&self, user_id: &str, vehicle_id: &str) -> StoreResult<Favorite>;

    async fn remove_favorite(&self, user_id: &str, vehicle_id: &str) -> StoreResult<bool>;

    // Favorited listings, most recently favorited first.
    async fn favorites(&self, user_id: &str) -> StoreResult<Vec<VehicleListing>>;
}

pub(crate) fn apply_update(search: &mut SavedSearch, update: SavedSearchUpdate) {
    if let Some(name) = update.name {
        search.name = name;
    }
    if let Some(query) = update.query {
        search.query = query;
    }
    if let Some(filters) = update.parsed_filters {
        search.parsed_filters = filters;
    }
    if let Some(alerts) = update.alerts_enabled {
        search.alerts_enabled = alerts;
    }
    if let Some(ran) = update.last_run_at {
        search.last_run_at = Some(ran);
    }
}
