// Application configuration, loaded with the 'config' crate and 'dotenv'

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::vocabulary::Vocabulary;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_address: String,
    pub firebase_project_id: Option<String>,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub ebay: EbaySettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub vocabulary: Vocabulary,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    // Without a key the extractor runs in fallback-only mode.
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EbaySettings {
    pub base_url: String,
    pub access_token: Option<String>,
    pub marketplace_id: String,
    // eBay Motors "Cars & Trucks"
    pub category_id: String,
    pub search_limit: u32,
    pub sync_limit: u32,
}

impl Default for EbaySettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.ebay.com/buy/browse/v1".to_string(),
            access_token: None,
            marketplace_id: "EBAY_US".to_string(),
            category_id: "6001".to_string(),
            search_limit: 50,
            sync_limit: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Firestore,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    // Cap on listings returned by a single filter query.
    pub page_size: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { backend: StoreBackend::Memory, page_size: 50 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SyncSettings {
    // Period of the background marketplace refresh; disabled when unset.
    pub interval_secs: Option<u64>,
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Config::builder()
            .set_default("server_address", "127.0.0.1:3000")?
            // Load from a configuration file (e.g., config.toml)
            .add_source(File::with_name("config").required(false))
            // Load from environment variables (e.g., APP_LLM__API_KEY)
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}
