// End-to-end search pipeline over fakes and the in-memory store

mod common;

use async_trait::async_trait;
use auction_finder::{
    aggregator::Aggregator,
    config::EbaySettings,
    connector::MarketplaceConnector,
    extractor::FilterExtractor,
    models::{NewVehicle, SearchFilters, VehicleListing},
    store::{MemoryStore, StoreError, StoreResult, VehicleQuery, VehicleStore},
    vocabulary::Vocabulary,
};
use common::{FakeMarketplace, hail_camry, new_vehicle};
use std::collections::HashSet;
use std::sync::Arc;

fn aggregator(market: Arc<FakeMarketplace>, store: Arc<dyn VehicleStore>) -> Aggregator {
    let connector = MarketplaceConnector::new(market, store.clone(), &Vocabulary::default(), &EbaySettings::default());
    Aggregator::new(Arc::new(connector), store, 50)
}

/// Store whose filter queries fail while exact lookups still work.
struct BrokenFilterStore(MemoryStore);

#[async_trait]
impl VehicleStore for BrokenFilterStore {
    async fn query_vehicles(&self, query: &VehicleQuery) -> StoreResult<Vec<VehicleListing>> {
        if query.external_id.is_none() {
            return Err(StoreError::Backend("connection reset".into()));
        }
        self.0.query_vehicles(query).await
    }

    async fn insert_vehicle(&self, vehicle: NewVehicle) -> StoreResult<VehicleListing> {
        self.0.insert_vehicle(vehicle).await
    }

    async fn get_vehicle(&self, id: &str) -> StoreResult<Option<VehicleListing>> {
        self.0.get_vehicle(id).await
    }
}

#[tokio::test]
async fn test_reference_query_finds_stored_listing() {
    let store = Arc::new(MemoryStore::new());
    store.insert_vehicle(hail_camry("stored-1")).await.unwrap();
    store.insert_vehicle(new_vehicle("stored-2", "Honda", "Civic")).await.unwrap();

    let extractor = FilterExtractor::fallback_only(Vocabulary::default());
    let filters = extractor
        .extract("Toyota Camry with hail damage under $10,000 in Texas")
        .await;
    assert_eq!(filters.make.as_deref(), Some("Toyota"));
    assert_eq!(filters.max_price, Some(10000.0));

    let market = Arc::new(FakeMarketplace::empty());
    let results = aggregator(market.clone(), store).search_vehicles(&filters).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].external_id, "stored-1");
    assert_eq!(market.queries(), vec!["Toyota camry hail damage".to_string()]);
}

#[tokio::test]
async fn test_listing_from_both_sources_appears_once() {
    let market = Arc::new(FakeMarketplace::with_titles(&[
        ("v1|1|0", "2019 Honda Accord Hail Damage 45,000 miles"),
        ("v1|2|0", "Mystery Project Car"),
    ]));
    let store = Arc::new(MemoryStore::new());
    let aggregator = aggregator(market, store.clone());

    // first pass persists the listing, second pass sees it from both sides
    aggregator.search_vehicles(&SearchFilters::default()).await;
    let results = aggregator.search_vehicles(&SearchFilters::default()).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].make, "Honda");
    assert_eq!(results[0].model, "Accord");
    assert_eq!(results[0].mileage, Some(45000));
    assert_eq!(store.vehicle_count().await, 1);

    let keys: HashSet<String> = results.iter().map(|v| v.dedup_key()).collect();
    assert_eq!(keys.len(), results.len());
}

#[tokio::test]
async fn test_store_failure_keeps_marketplace_results() {
    let market = Arc::new(FakeMarketplace::with_titles(&[("v1|9|0", "2020 Ford F-150 XLT")]));
    let store: Arc<dyn VehicleStore> = Arc::new(BrokenFilterStore(MemoryStore::new()));

    let results = aggregator(market, store).search_vehicles(&SearchFilters::default()).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].model, "F-150");
}

#[tokio::test]
async fn test_marketplace_failure_keeps_store_results() {
    let mut fake = FakeMarketplace::with_titles(&[("v1|1|0", "2019 Honda Accord")]);
    fake.fail = true;
    let store = Arc::new(MemoryStore::new());
    store.insert_vehicle(hail_camry("stored-1")).await.unwrap();

    let results = aggregator(Arc::new(fake), store).search_vehicles(&SearchFilters::default()).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].external_id, "stored-1");
}

#[tokio::test]
async fn test_results_rank_by_relevance() {
    let market = Arc::new(FakeMarketplace::with_titles(&[
        ("v1|1|0", "2017 Honda Civic"),
        ("v1|2|0", "2018 Toyota Corolla"),
        ("v1|3|0", "2016 Honda Accord"),
    ]));
    let store = Arc::new(MemoryStore::new());
    let filters = SearchFilters {
        make: Some("honda".into()),
        model: Some("accord".into()),
        ..Default::default()
    };

    let results = aggregator(market, store).search_vehicles(&filters).await;
    let models: Vec<&str> = results.iter().map(|v| v.model.as_str()).collect();
    assert_eq!(models[0], "Accord");
    assert_eq!(models[1], "Civic");
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let market = Arc::new(FakeMarketplace::with_titles(&[
        ("v1|1|0", "2019 Honda Accord"),
        ("v1|2|0", "2021 Nissan Altima SR"),
        ("v1|3|0", "Parts lot, no car"),
    ]));
    let store = Arc::new(MemoryStore::new());
    let aggregator = aggregator(market, store.clone());

    assert_eq!(aggregator.sync_source("ebay").await, 2);
    assert_eq!(aggregator.sync_source("ebay").await, 0);
    assert_eq!(store.vehicle_count().await, 2);

    assert_eq!(aggregator.sync_source("copart").await, 0);
}
