// Combines live marketplace results with stored listings

use std::collections::HashSet;
use std::sync::Arc;

use crate::connector::MarketplaceConnector;
use crate::models::{SearchFilters, VehicleListing};
use crate::store::{VehicleQuery, VehicleStore};

const MAKE_POINTS: u32 = 10;
const MODEL_POINTS: u32 = 8;
const PRICE_POINTS: u32 = 5;
const DAMAGE_POINTS: u32 = 3;

pub struct Aggregator {
    connector: Arc<MarketplaceConnector>,
    store: Arc<dyn VehicleStore>,
    page_size: usize,
}

impl Aggregator {
    pub fn new(connector: Arc<MarketplaceConnector>, store: Arc<dyn VehicleStore>, page_size: usize) -> Self {
        Self { connector, store, page_size }
    }

    // Never fails; a store error degrades to marketplace-only results.
    pub async fn search_vehicles(&self, filters: &SearchFilters) -> Vec<VehicleListing> {
        let query = VehicleQuery::from_filters(filters, self.page_size);
        let (marketplace, stored) = tokio::join!(
            self.connector.search(filters),
            self.store.query_vehicles(&query)
        );

        let stored = stored.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Stored listing query failed, returning marketplace results only");
            Vec::new()
        });

        let combined: Vec<VehicleListing> = marketplace.into_iter().chain(stored).collect();
        let total = combined.len();
        let mut results = deduplicate(combined);
        rank(&mut results, filters);
        tracing::debug!(total, unique = results.len(), "Aggregated search results");
        results
    }

    // Background refresh for one source. Returns the number of new listings.
    pub async fn sync_source(&self, source: &str) -> usize {
        if source != self.connector.source() {
            tracing::warn!(source, "sync not implemented");
            return 0;
        }
        self.connector.sync_recent_listings().await
    }
}

// Keeps the first listing seen for each dedup key, preserving order.
pub fn deduplicate(listings: Vec<VehicleListing>) -> Vec<VehicleListing> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|v| seen.insert(v.dedup_key()))
        .collect()
}

pub fn relevance_score(vehicle: &VehicleListing, filters: &SearchFilters) -> u32 {
    let mut score = 0;

    if let Some(make) = &filters.make {
        if vehicle.make.eq_ignore_ascii_case(make) {
            score += MAKE_POINTS;
        }
    }
    if let Some(model) = &filters.model {
        if vehicle.model.to_lowercase().contains(&model.to_lowercase()) {
            score += MODEL_POINTS;
        }
    }
    if let (Some(max_price), Some(bid)) = (filters.max_price, vehicle.current_bid) {
        if bid <= max_price {
            score += PRICE_POINTS;
        }
    }
    if let (Some(wanted), Some(damage)) = (&filters.damage_type, vehicle.damage_type) {
        if damage.as_str().contains(&wanted.to_lowercase()) {
            score += DAMAGE_POINTS;
        }
    }

    score
}

// Orders by score, then newest first. Equal keys keep their input order.
pub fn rank(listings: &mut [VehicleListing], filters: &SearchFilters) {
    listings.sort_by_cached_key(|v| (std::cmp::Reverse(relevance_score(v, filters)), std::cmp::Reverse(v.created_at)));
}
