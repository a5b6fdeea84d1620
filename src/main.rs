use anyhow::{Context, Result};
use auction_finder::{
    aggregator::Aggregator,
    auth_middleware::{FirebaseIdentityResolver, IdentityResolver},
    config::{Settings, StoreBackend},
    connector::MarketplaceConnector,
    ebay::{EbayBrowseClient, ItemSearch, ItemSummary, MarketplaceError, MarketplaceSearchProvider},
    extractor::FilterExtractor,
    llm::{CompletionProvider, OpenAiClient},
    routes,
    state::AppState,
    store::{FirestoreStore, MemoryStore, UserDataStore, VehicleStore},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::{env, fs, net::SocketAddr, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// Define structure for proxy configuration
#[derive(Deserialize, Debug)]
struct ProxyConfig {
    http_proxy: Option<String>,
    https_proxy: Option<String>,
}

// Function to load proxy config and set environment variables
fn load_and_set_proxy_env_vars() -> Result<()> {
    let config_path = Path::new("proxyconfig.json");
    if !config_path.exists() {
        tracing::info!("proxyconfig.json not found, skipping proxy environment variable setup.");
        return Ok(());
    }

    let config_content = fs::read_to_string(config_path).context("Failed to read proxyconfig.json")?;
    let proxy_config: ProxyConfig =
        serde_json::from_str(&config_content).context("Failed to parse proxyconfig.json")?;

    for (var, value) in [("HTTP_PROXY", proxy_config.http_proxy), ("HTTPS_PROXY", proxy_config.https_proxy)] {
        if let Some(proxy) = value.filter(|p| !p.is_empty()) {
            // SAFETY: runs during startup, before any spawned task or HTTP client reads the environment
            unsafe { env::set_var(var, proxy) };
            tracing::info!("Set {} environment variable from config.", var);
        }
    }
    Ok(())
}

// Stand-in used when no eBay token is configured; the connector turns its
// errors into empty result sets.
struct UnconfiguredMarketplace;

#[async_trait]
impl MarketplaceSearchProvider for UnconfiguredMarketplace {
    fn source(&self) -> &str {
        "ebay"
    }

    async fn search_items(&self, _search: &ItemSearch) -> Result<Vec<ItemSummary>, MarketplaceError> {
        Err(MarketplaceError::NotConfigured("ebay.access_token is not set".into()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "auction_finder=info,tower_http=info".into()))
        .with(fmt::layer())
        .init();

    // Proxy settings must be in place before the shared client is built
    if let Err(e) = load_and_set_proxy_env_vars() {
        tracing::warn!("Failed to load or apply proxy configuration: {}", e);
    }

    tracing::info!("Initializing auction finder server...");
    let settings = Arc::new(Settings::new().context("Failed to load configuration")?);

    let http_client = Arc::new(
        Client::builder()
            .timeout(Duration::from_secs(settings.http.timeout_secs))
            .build()
            .context("Failed to build shared reqwest client")?,
    );

    // --- Persistence ---
    let (vehicles, user_data): (Arc<dyn VehicleStore>, Arc<dyn UserDataStore>) = match settings.store.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store");
            let store = Arc::new(MemoryStore::new());
            (store.clone() as Arc<dyn VehicleStore>, store as Arc<dyn UserDataStore>)
        }
        StoreBackend::Firestore => {
            let project_id = settings
                .firebase_project_id
                .as_deref()
                .context("firebase_project_id is required for the firestore backend")?;
            tracing::info!(project_id, "Using Firestore store");
            let store = Arc::new(FirestoreStore::from_env(http_client.clone(), project_id).await?);
            (store.clone() as Arc<dyn VehicleStore>, store as Arc<dyn UserDataStore>)
        }
    };

    // --- Search pipeline ---
    let completion: Option<Arc<dyn CompletionProvider>> = match OpenAiClient::new(http_client.clone(), &settings.llm) {
        Ok(client) => Some(Arc::new(client) as Arc<dyn CompletionProvider>),
        Err(e) => {
            tracing::warn!(error = %e, "Language model unavailable, filter extraction runs in fallback mode");
            None
        }
    };
    let extractor = Arc::new(FilterExtractor::new(
        completion,
        settings.vocabulary.clone(),
        settings.llm.temperature,
    ));

    let marketplace: Arc<dyn MarketplaceSearchProvider> = match EbayBrowseClient::new(http_client.clone(), &settings.ebay) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "eBay client unavailable, live marketplace results disabled");
            Arc::new(UnconfiguredMarketplace)
        }
    };
    let connector = Arc::new(MarketplaceConnector::new(
        marketplace,
        vehicles.clone(),
        &settings.vocabulary,
        &settings.ebay,
    ));
    let aggregator = Arc::new(Aggregator::new(connector, vehicles.clone(), settings.store.page_size));

    if let Some(interval_secs) = settings.sync.interval_secs.filter(|s| *s > 0) {
        let aggregator = aggregator.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                let inserted = aggregator.sync_source("ebay").await;
                tracing::info!(inserted, "Periodic marketplace sync finished");
            }
        });
        tracing::info!(interval_secs, "Periodic marketplace sync scheduled");
    }

    let identity: Arc<dyn IdentityResolver> = Arc::new(FirebaseIdentityResolver::new(
        http_client.clone(),
        settings.firebase_project_id.clone(),
    ));

    let app_state = AppState {
        extractor,
        aggregator,
        vehicles,
        user_data,
        identity,
    };

    let app = routes::create_router(app_state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = settings
        .server_address
        .parse()
        .with_context(|| format!("Invalid server address format: {}", settings.server_address))?;
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
