// Turns search filters into marketplace queries and persists what comes back

use std::sync::Arc;

use crate::config::EbaySettings;
use crate::ebay::{ItemSearch, ItemSummary, MarketplaceSearchProvider};
use crate::models::{SearchFilters, VehicleListing};
use crate::normalize::{TitleParser, normalize_item};
use crate::store::{StoreError, VehicleQuery, VehicleStore};
use crate::vocabulary::Vocabulary;

const DEFAULT_QUERY: &str = "cars trucks";
const SYNC_QUERY: &str = "cars";
const SYNC_SORT: &str = "newlyListed";

// Builds the free-text marketplace query from structured filters.
pub fn build_search_query(filters: &SearchFilters) -> String {
    let mut tokens: Vec<String> = Vec::new();

    if let Some(make) = &filters.make {
        tokens.push(make.clone());
    }
    if let Some(model) = &filters.model {
        tokens.push(model.clone());
    }
    match (filters.min_year, filters.max_year) {
        (Some(min), Some(max)) => tokens.push(format!("{}-{}", min, max)),
        (Some(min), None) => tokens.push(format!("{}+", min)),
        (None, Some(max)) => tokens.push(format!("-{}", max)),
        (None, None) => {}
    }
    if let Some(damage) = &filters.damage_type {
        if damage.to_lowercase().contains("clean") {
            tokens.push("clean title".to_string());
        } else {
            tokens.push(format!("{} damage", damage));
        }
    }

    let tokens: Vec<String> = tokens.into_iter().filter(|t| !t.trim().is_empty()).collect();
    if tokens.is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        tokens.join(" ")
    }
}

pub struct MarketplaceConnector {
    provider: Arc<dyn MarketplaceSearchProvider>,
    store: Arc<dyn VehicleStore>,
    parser: TitleParser,
    category_id: String,
    search_limit: u32,
    sync_limit: u32,
}

impl MarketplaceConnector {
    pub fn new(
        provider: Arc<dyn MarketplaceSearchProvider>,
        store: Arc<dyn VehicleStore>,
        vocabulary: &Vocabulary,
        settings: &EbaySettings,
    ) -> Self {
        Self {
            provider,
            store,
            parser: TitleParser::new(vocabulary),
            category_id: settings.category_id.clone(),
            search_limit: settings.search_limit,
            sync_limit: settings.sync_limit,
        }
    }

    pub fn source(&self) -> &str {
        self.provider.source()
    }

    // Live marketplace search. Failures are logged and yield an empty list.
    pub async fn search(&self, filters: &SearchFilters) -> Vec<VehicleListing> {
        let search = ItemSearch {
            query: build_search_query(filters),
            category_id: self.category_id.clone(),
            limit: self.search_limit,
            sort: None,
        };

        let items = match self.provider.search_items(&search).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(source = self.source(), query = %search.query, error = %e, "Marketplace search failed");
                return Vec::new();
            }
        };

        let mut listings = Vec::with_capacity(items.len());
        for item in &items {
            if let Some((listing, _)) = self.persist_item(item).await {
                listings.push(listing);
            }
        }
        tracing::info!(source = self.source(), query = %search.query, fetched = items.len(), kept = listings.len(), "Marketplace search complete");
        listings
    }

    // Pulls the newest listings and stores the unseen ones.
    // Returns how many were inserted.
    pub async fn sync_recent_listings(&self) -> usize {
        let search = ItemSearch {
            query: SYNC_QUERY.to_string(),
            category_id: self.category_id.clone(),
            limit: self.sync_limit,
            sort: Some(SYNC_SORT.to_string()),
        };

        let items = match self.provider.search_items(&search).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(source = self.source(), error = %e, "Marketplace sync failed");
                return 0;
            }
        };

        let mut inserted = 0;
        for item in &items {
            if let Some((_, true)) = self.persist_item(item).await {
                inserted += 1;
            }
        }
        tracing::info!(source = self.source(), fetched = items.len(), inserted, "Marketplace sync complete");
        inserted
    }

    // Normalizes one item and resolves it to a stored record.
    // The flag is true when this call inserted the record.
    async fn persist_item(&self, item: &ItemSummary) -> Option<(VehicleListing, bool)> {
        let source = self.source();
        let vehicle = normalize_item(item, source, &self.parser)?;
        let lookup = VehicleQuery::by_external_id(source, &vehicle.external_id);

        match self.store.query_vehicles(&lookup).await {
            Ok(mut existing) if !existing.is_empty() => return Some((existing.remove(0), false)),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(item_id = %item.item_id, error = %e, "Listing lookup failed, skipping item");
                return None;
            }
        }

        match self.store.insert_vehicle(vehicle).await {
            Ok(stored) => Some((stored, true)),
            Err(StoreError::Conflict { .. }) => {
                // lost an insert race; use the winner's record
                match self.store.query_vehicles(&lookup).await {
                    Ok(mut existing) if !existing.is_empty() => Some((existing.remove(0), false)),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(item_id = %item.item_id, error = %e, "Re-read after conflict failed");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(item_id = %item.item_id, error = %e, "Failed to store listing, skipping item");
                None
            }
        }
    }
}
