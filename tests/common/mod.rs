// Shared fakes for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use auction_finder::{
    auth_middleware::{AuthError, Identity, IdentityResolver},
    ebay::{ItemSearch, ItemSummary, MarketplaceError, MarketplaceSearchProvider},
    models::{DamageType, NewVehicle},
};
use std::sync::Mutex;

/// Marketplace double returning a fixed item list.
pub struct FakeMarketplace {
    pub items: Vec<ItemSummary>,
    pub fail: bool,
    pub searches: Mutex<Vec<ItemSearch>>,
}

impl FakeMarketplace {
    pub fn empty() -> Self {
        Self::with_titles(&[])
    }

    pub fn with_titles(titles: &[(&str, &str)]) -> Self {
        let items = titles
            .iter()
            .map(|(id, title)| ItemSummary {
                item_id: id.to_string(),
                title: title.to_string(),
                ..Default::default()
            })
            .collect();
        Self { items, fail: false, searches: Mutex::new(Vec::new()) }
    }

    pub fn queries(&self) -> Vec<String> {
        self.searches.lock().unwrap().iter().map(|s| s.query.clone()).collect()
    }
}

#[async_trait]
impl MarketplaceSearchProvider for FakeMarketplace {
    fn source(&self) -> &str {
        "ebay"
    }

    async fn search_items(&self, search: &ItemSearch) -> Result<Vec<ItemSummary>, MarketplaceError> {
        self.searches.lock().unwrap().push(search.clone());
        if self.fail {
            return Err(MarketplaceError::Status { status: 500, body: "unavailable".into() });
        }
        Ok(self.items.clone())
    }
}

/// Accepts the tokens "user-1" and "user-2" as themselves.
pub struct StaticIdentity;

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        match token {
            "user-1" | "user-2" => Ok(Identity {
                user_id: token.to_string(),
                email: Some(format!("{}@example.com", token)),
            }),
            _ => Err(AuthError::Invalid),
        }
    }
}

pub fn new_vehicle(external_id: &str, make: &str, model: &str) -> NewVehicle {
    NewVehicle {
        external_id: external_id.into(),
        source: "ebay".into(),
        title: format!("2018 {} {}", make, model),
        make: make.into(),
        model: model.into(),
        year: 2018,
        vin: None,
        mileage: None,
        current_bid: None,
        buy_it_now_price: None,
        damage_type: None,
        location: None,
        auction_date: None,
        auction_end_date: None,
        image_urls: vec![],
        auction_url: None,
        is_active: true,
    }
}

pub fn hail_camry(external_id: &str) -> NewVehicle {
    NewVehicle {
        current_bid: Some(9000.0),
        damage_type: Some(DamageType::Hail),
        location: Some("Houston, Texas".into()),
        ..new_vehicle(external_id, "Toyota", "Camry")
    }
}
