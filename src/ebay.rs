// eBay Browse API client (item summary search)

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::config::EbaySettings;

const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error("marketplace request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("marketplace API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed marketplace payload: {0}")]
    Payload(String),

    #[error("marketplace not configured: {0}")]
    NotConfigured(String),
}

// Parameters of one item-search call.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSearch {
    pub query: String,
    pub category_id: String,
    pub limit: u32,
    // Provider sort key, e.g. `newlyListed`.
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    pub value: Option<Value>,
}

impl Amount {
    // eBay sends amounts as decimal strings; tolerate bare numbers as well.
    pub fn as_f64(&self) -> Option<f64> {
        match self.value.as_ref()? {
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
        .filter(|v| v.is_finite())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ItemLocation {
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ItemImage {
    pub image_url: Option<String>,
}

// Summary record of a single marketplace item.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub item_id: String,
    #[serde(default)]
    pub title: String,
    pub price: Option<Amount>,
    pub buy_it_now_price: Option<Amount>,
    pub item_location: Option<ItemLocation>,
    #[serde(alias = "itemCreationDate")]
    pub listing_date: Option<String>,
    #[serde(alias = "itemEndDate")]
    pub end_date: Option<String>,
    pub image: Option<ItemImage>,
    pub item_web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPagedCollection {
    #[serde(default)]
    item_summaries: Vec<Value>,
}

// Capability interface over a marketplace's item search endpoint.
#[async_trait]
pub trait MarketplaceSearchProvider: Send + Sync {
    // Source name stamped on normalized listings.
    fn source(&self) -> &str;

    async fn search_items(&self, search: &ItemSearch) -> Result<Vec<ItemSummary>, MarketplaceError>;
}

pub struct EbayBrowseClient {
    http_client: Arc<Client>,
    base_url: String,
    access_token: String,
    marketplace_id: String,
}

impl EbayBrowseClient {
    pub fn new(http_client: Arc<Client>, settings: &EbaySettings) -> Result<Self, MarketplaceError> {
        let access_token = settings
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| MarketplaceError::NotConfigured("ebay.access_token is not set".into()))?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            access_token,
            marketplace_id: settings.marketplace_id.clone(),
        })
    }

    fn is_retryable(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }
}

// Parses a search response body, skipping items that do not fit the summary shape.
pub fn parse_item_summaries(body: &[u8]) -> Result<Vec<ItemSummary>, MarketplaceError> {
    let collection: SearchPagedCollection =
        serde_json::from_slice(body).map_err(|e| MarketplaceError::Payload(e.to_string()))?;

    Ok(collection
        .item_summaries
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<ItemSummary>(raw) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed item summary");
                None
            }
        })
        .collect())
}

#[async_trait]
impl MarketplaceSearchProvider for EbayBrowseClient {
    fn source(&self) -> &str {
        "ebay"
    }

    async fn search_items(&self, search: &ItemSearch) -> Result<Vec<ItemSummary>, MarketplaceError> {
        let url = format!("{}/item_summary/search", self.base_url);
        let mut params = vec![
            ("q", search.query.clone()),
            ("category_ids", search.category_id.clone()),
            ("limit", search.limit.to_string()),
        ];
        if let Some(sort) = &search.sort {
            params.push(("sort", sort.clone()));
        }

        let mut retry_delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS);
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(attempt, query = %search.query, "Requesting eBay item search");

            let result = self
                .http_client
                .get(&url)
                .query(&params)
                .bearer_auth(&self.access_token)
                .header("X-EBAY-C-MARKETPLACE-ID", &self.marketplace_id)
                .send()
                .await;

            let response = match result {
                Ok(r) => r,
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(attempt, error = %e, "Network error during eBay search. Retrying...");
                    sleep(retry_delay).await;
                    retry_delay *= 2;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                if Self::is_retryable(status) && attempt < MAX_RETRIES {
                    tracing::warn!(attempt, status = %status, "eBay search returned retryable status. Retrying...");
                    sleep(retry_delay).await;
                    retry_delay *= 2;
                    continue;
                }
                return Err(MarketplaceError::Status { status: status.as_u16(), body });
            }

            let bytes = response.bytes().await?;
            let items = parse_item_summaries(&bytes)?;
            tracing::debug!(count = items.len(), "eBay search returned items");
            return Ok(items);
        }
    }
}
