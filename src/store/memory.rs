// In-process store used for development and tests

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::{StoreError, StoreResult, UserDataStore, VehicleQuery, VehicleStore, apply_update};
use crate::models::{
    Favorite, NewSavedSearch, NewSearchHistory, NewVehicle, SavedSearch, SavedSearchUpdate,
    SearchHistoryRecord, VehicleListing,
};

#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicU64,
    vehicles: RwLock<Vec<VehicleListing>>,
    history: RwLock<Vec<SearchHistoryRecord>>,
    saved: RwLock<Vec<SavedSearch>>,
    // user id -> favorites in insertion order
    favorites: RwLock<HashMap<String, Vec<Favorite>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    pub async fn vehicle_count(&self) -> usize {
        self.vehicles.read().await.len()
    }
}

#[async_trait]
impl VehicleStore for MemoryStore {
    async fn query_vehicles(&self, query: &VehicleQuery) -> StoreResult<Vec<VehicleListing>> {
        let vehicles = self.vehicles.read().await;
        let mut hits: Vec<VehicleListing> =
            vehicles.iter().filter(|v| query.matches(v)).cloned().collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn insert_vehicle(&self, vehicle: NewVehicle) -> StoreResult<VehicleListing> {
        let mut vehicles = self.vehicles.write().await;
        if vehicles
            .iter()
            .any(|v| v.source == vehicle.source && v.external_id == vehicle.external_id)
        {
            return Err(StoreError::Conflict {
                marketplace: vehicle.source,
                external_id: vehicle.external_id,
            });
        }

        let stored = VehicleListing::from_new(self.allocate_id(), vehicle, Utc::now());
        vehicles.push(stored.clone());
        Ok(stored)
    }

    async fn get_vehicle(&self, id: &str) -> StoreResult<Option<VehicleListing>> {
        Ok(self.vehicles.read().await.iter().find(|v| v.id == id).cloned())
    }
}

#[async_trait]
impl UserDataStore for MemoryStore {
    async fn record_search(&self, record: NewSearchHistory) -> StoreResult<SearchHistoryRecord> {
        let stored = SearchHistoryRecord {
            id: self.allocate_id(),
            user_id: record.user_id,
            query: record.query,
            parsed_filters: record.parsed_filters,
            result_count: record.result_count,
            created_at: Utc::now(),
        };
        self.history.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn search_history(&self, user_id: &str, limit: usize) -> StoreResult<Vec<SearchHistoryRecord>> {
        let history = self.history.read().await;
        // insertion order is chronological
        Ok(history
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_saved_search(&self, search: NewSavedSearch) -> StoreResult<SavedSearch> {
        let stored = SavedSearch {
            id: self.allocate_id(),
            user_id: search.user_id,
            name: search.name,
            query: search.query,
            parsed_filters: search.parsed_filters,
            alerts_enabled: search.alerts_enabled,
            last_run_at: None,
            created_at: Utc::now(),
        };
        self.saved.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn saved_searches(&self, user_id: &str) -> StoreResult<Vec<SavedSearch>> {
        let saved = self.saved.read().await;
        Ok(saved.iter().rev().filter(|s| s.user_id == user_id).cloned().collect())
    }

    async fn get_saved_search(&self, user_id: &str, id: &str) -> StoreResult<Option<SavedSearch>> {
        let saved = self.saved.read().await;
        Ok(saved.iter().find(|s| s.user_id == user_id && s.id == id).cloned())
    }

    async fn update_saved_search(
        &self,
        user_id: &str,
        id: &str,
        update: SavedSearchUpdate,
    ) -> StoreResult<Option<SavedSearch>> {
        let mut saved = self.saved.write().await;
        let Some(search) = saved.iter_mut().find(|s| s.user_id == user_id && s.id == id) else {
            return Ok(None);
        };
        apply_update(search, update);
        Ok(Some(search.clone()))
    }

    async fn delete_saved_search(&self, user_id: &str, id: &str) -> StoreResult<bool> {
        let mut saved = self.saved.write().await;
        let before = saved.len();
        saved.retain(|s| !(s.user_id == user_id && s.id == id));
        Ok(saved.len() != before)
    }

    async fn add_favorite(&self, user_id: &str, vehicle_id: &str) -> StoreResult<Favorite> {
        let mut favorites = self.favorites.write().await;
        let entries = favorites.entry(user_id.to_string()).or_default();
        if let Some(existing) = entries.iter().find(|f| f.vehicle_id == vehicle_id) {
            return Ok(existing.clone());
        }
        let favorite = Favorite {
            user_id: user_id.to_string(),
            vehicle_id: vehicle_id.to_string(),
            created_at: Utc::now(),
        };
        entries.push(favorite.clone());
        Ok(favorite)
    }

    async fn remove_favorite(&self, user_id: &str, vehicle_id: &str) -> StoreResult<bool> {
        let mut favorites = self.favorites.write().await;
        let Some(entries) = favorites.get_mut(user_id) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|f| f.vehicle_id != vehicle_id);
        Ok(entries.len() != before)
    }

    async fn favorites(&self, user_id: &str) -> StoreResult<Vec<VehicleListing>> {
        let favorites = self.favorites.read().await;
        let vehicles = self.vehicles.read().await;
        Ok(favorites
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .rev()
                    .filter_map(|f| vehicles.iter().find(|v| v.id == f.vehicle_id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}
