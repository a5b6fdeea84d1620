// Domain data structures shared by the pipeline, the stores and the API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// None means unconstrained; an empty filter set matches everything
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")] // Match JavaScript frontend keys
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        *self == SearchFilters::default()
    }
}

// Controlled damage vocabulary that listing titles are normalized into.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    Salvage,
    Flood,
    Hail,
    Collision,
    Fire,
    Theft,
    Clean,
    Rebuilt,
    Lemon,
}

impl DamageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DamageType::Salvage => "salvage",
            DamageType::Flood => "flood",
            DamageType::Hail => "hail",
            DamageType::Collision => "collision",
            DamageType::Fire => "fire",
            DamageType::Theft => "theft",
            DamageType::Clean => "clean",
            DamageType::Rebuilt => "rebuilt",
            DamageType::Lemon => "lemon",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleListing {
    pub id: String,
    pub external_id: String,
    pub source: String,
    pub title: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub vin: Option<String>,
    pub mileage: Option<u32>,
    pub current_bid: Option<f64>,
    pub buy_it_now_price: Option<f64>,
    pub damage_type: Option<DamageType>,
    pub location: Option<String>,
    pub auction_date: Option<DateTime<Utc>>,
    pub auction_end_date: Option<DateTime<Utc>>,
    pub image_urls: Vec<String>,
    pub auction_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VehicleListing {
    // Identity used to collapse duplicates: VIN when known, else source + external id.
    pub fn dedup_key(&self) -> String {
        match self.vin.as_deref().filter(|v| !v.is_empty()) {
            Some(vin) => vin.to_string(),
            None => format!("{}-{}", self.source, self.external_id),
        }
    }

    // Builds the persisted form of a freshly observed listing.
    pub fn from_new(id: String, new: NewVehicle, now: DateTime<Utc>) -> Self {
        VehicleListing {
            id,
            external_id: new.external_id,
            source: new.source,
            title: new.title,
            make: new.make,
            model: new.model,
            year: new.year,
            vin: new.vin,
            mileage: new.mileage,
            current_bid: new.current_bid,
            buy_it_now_price: new.buy_it_now_price,
            damage_type: new.damage_type,
            location: new.location,
            auction_date: new.auction_date,
            auction_end_date: new.auction_end_date,
            image_urls: new.image_urls,
            auction_url: new.auction_url,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

// Insert shape of a listing; the store assigns the id and timestamps.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewVehicle {
    pub external_id: String,
    pub source: String,
    pub title: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub vin: Option<String>,
    pub mileage: Option<u32>,
    pub current_bid: Option<f64>,
    pub buy_it_now_price: Option<f64>,
    pub damage_type: Option<DamageType>,
    pub location: Option<String>,
    pub auction_date: Option<DateTime<Utc>>,
    pub auction_end_date: Option<DateTime<Utc>>,
    pub image_urls: Vec<String>,
    pub auction_url: Option<String>,
    pub is_active: bool,
}

// One row per search invocation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryRecord {
    pub id: String,
    pub user_id: String,
    pub query: String,
    pub parsed_filters: SearchFilters,
    pub result_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSearchHistory {
    pub user_id: String,
    pub query: String,
    pub parsed_filters: SearchFilters,
    pub result_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub query: String,
    pub parsed_filters: SearchFilters,
    pub alerts_enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSavedSearch {
    pub user_id: String,
    pub name: String,
    pub query: String,
    pub parsed_filters: SearchFilters,
    pub alerts_enabled: bool,
}

// Partial edit of a saved search; `None` leaves the field untouched.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearchUpdate {
    pub name: Option<String>,
    pub query: Option<String>,
    pub parsed_filters: Option<SearchFilters>,
    pub alerts_enabled: Option<bool>,
    #[serde(skip)]
    pub last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub user_id: String,
    pub vehicle_id: String,
    pub created_at: DateTime<Utc>,
}
