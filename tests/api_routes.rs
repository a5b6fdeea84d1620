// HTTP API exercised through the router with in-memory collaborators

mod common;

use auction_finder::{
    aggregator::Aggregator,
    config::EbaySettings,
    connector::MarketplaceConnector,
    extractor::FilterExtractor,
    models::{NewSearchHistory, SearchFilters},
    routes::create_router,
    state::AppState,
    store::{MemoryStore, UserDataStore, VehicleStore},
    vocabulary::Vocabulary,
};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{FakeMarketplace, StaticIdentity, hail_camry};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn setup_test_app(store: Arc<MemoryStore>) -> Router {
    let market = Arc::new(FakeMarketplace::empty());
    let connector = MarketplaceConnector::new(market, store.clone(), &Vocabulary::default(), &EbaySettings::default());
    let aggregator = Aggregator::new(Arc::new(connector), store.clone(), 50);

    create_router(AppState {
        extractor: Arc::new(FilterExtractor::fallback_only(Vocabulary::default())),
        aggregator: Arc::new(aggregator),
        vehicles: store.clone(),
        user_data: store,
        identity: Arc::new(StaticIdentity),
    })
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let app = setup_test_app(Arc::new(MemoryStore::new()));
    let (status, json) = call(&app, "GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_protected_routes_reject_missing_or_bad_tokens() {
    let app = setup_test_app(Arc::new(MemoryStore::new()));

    let (status, json) = call(&app, "POST", "/api/search", None, Some(json!({ "query": "honda" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].is_string());

    let (status, _) = call(&app, "GET", "/api/users/me", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = call(&app, "GET", "/api/users/me", Some("user-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["userId"], "user-1");
}

#[tokio::test]
async fn test_filters_endpoint() {
    let app = setup_test_app(Arc::new(MemoryStore::new()));
    let (status, json) = call(
        &app,
        "POST",
        "/api/filters",
        Some("user-1"),
        Some(json!({ "query": "flood honda civic in florida" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "make": "Honda", "model": "civic", "damageType": "flood", "location": "florida" }));
}

#[tokio::test]
async fn test_blank_search_is_bad_request() {
    let app = setup_test_app(Arc::new(MemoryStore::new()));
    let (status, json) = call(&app, "POST", "/api/search", Some("user-1"), Some(json!({ "query": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_search_returns_results_and_records_history() {
    let store = Arc::new(MemoryStore::new());
    store.insert_vehicle(hail_camry("camry-1")).await.unwrap();
    let app = setup_test_app(store);

    let query = "Toyota Camry with hail damage under $10,000 in Texas";
    let (status, json) = call(&app, "POST", "/api/search", Some("user-1"), Some(json!({ "query": query }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["query"], query);
    assert_eq!(json["count"], 1);
    assert_eq!(json["parsedFilters"]["maxPrice"], 10000.0);
    assert_eq!(json["results"][0]["externalId"], "camry-1");

    let (status, history) = call(&app, "GET", "/api/search/history", Some("user-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["resultCount"], 1);

    let (_, other) = call(&app, "GET", "/api/search/history?limit=5", Some("user-2"), None).await;
    assert!(other.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_saved_search_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    store.insert_vehicle(hail_camry("camry-1")).await.unwrap();
    let app = setup_test_app(store);

    let (status, created) = call(
        &app,
        "POST",
        "/api/saved-searches",
        Some("user-1"),
        Some(json!({ "name": "Texas hail", "query": "toyota hail in texas" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["parsedFilters"]["make"], "Toyota");
    assert_eq!(created["alertsEnabled"], false);
    let id = created["id"].as_str().unwrap().to_string();

    let (_, listed) = call(&app, "GET", "/api/saved-searches", Some("user-2"), None).await;
    assert!(listed.as_array().unwrap().is_empty());

    let uri = format!("/api/saved-searches/{}", id);
    let (status, updated) = call(&app, "PUT", &uri, Some("user-1"), Some(json!({ "alertsEnabled": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["alertsEnabled"], true);
    assert_eq!(updated["name"], "Texas hail");

    let (status, _) = call(&app, "PUT", &uri, Some("user-2"), Some(json!({ "name": "mine now" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, ran) = call(&app, "POST", &format!("{}/run", uri), Some("user-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ran["count"], 1);
    assert!(ran["savedSearch"]["lastRunAt"].is_string());

    let (status, _) = call(&app, "DELETE", &uri, Some("user-1"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, json) = call(&app, "DELETE", &uri, Some("user-1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Saved search not found");
}

#[tokio::test]
async fn test_favorites_flow() {
    let store = Arc::new(MemoryStore::new());
    let vehicle = store.insert_vehicle(hail_camry("camry-1")).await.unwrap();
    let app = setup_test_app(store);

    let (status, _) = call(&app, "POST", "/api/favorites", Some("user-1"), Some(json!({ "vehicleId": "nope" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let body = json!({ "vehicleId": &vehicle.id });
    let (status, favorite) = call(&app, "POST", "/api/favorites", Some("user-1"), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(favorite["vehicleId"], vehicle.id.as_str());
    // favoriting again is harmless
    let (status, _) = call(&app, "POST", "/api/favorites", Some("user-1"), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, favorites) = call(&app, "GET", "/api/favorites", Some("user-1"), None).await;
    assert_eq!(favorites.as_array().unwrap().len(), 1);
    assert_eq!(favorites[0]["id"], vehicle.id.as_str());

    let uri = format!("/api/favorites/{}", vehicle.id);
    let (status, _) = call(&app, "DELETE", &uri, Some("user-1"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "DELETE", &uri, Some("user-1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_vehicle_lookup() {
    let store = Arc::new(MemoryStore::new());
    let vehicle = store.insert_vehicle(hail_camry("camry-1")).await.unwrap();
    let app = setup_test_app(store);

    let (status, json) = call(&app, "GET", &format!("/api/vehicles/{}", vehicle.id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["damageType"], "hail");

    let (status, json) = call(&app, "GET", "/api/vehicles/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Vehicle not found");
}

#[tokio::test]
async fn test_encoded_path_ids_cannot_reach_other_users() {
    let store = Arc::new(MemoryStore::new());
    let vehicle = store.insert_vehicle(hail_camry("camry-1")).await.unwrap();
    let app = setup_test_app(store);

    let (_, created) = call(
        &app,
        "POST",
        "/api/saved-searches",
        Some("user-2"),
        Some(json!({ "name": "Mine", "query": "toyota hail" })),
    )
    .await;
    let victim_id = created["id"].as_str().unwrap().to_string();
    let (status, _) = call(&app, "POST", "/api/favorites", Some("user-2"), Some(json!({ "vehicleId": &vehicle.id }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let crafted = format!("..%2F..%2Fuser-2%2FsavedSearches%2F{}", victim_id);
    for (method, uri) in [
        ("DELETE", format!("/api/saved-searches/{}", crafted)),
        ("POST", format!("/api/saved-searches/{}/run", crafted)),
        ("DELETE", format!("/api/favorites/..%2F..%2Fuser-2%2Ffavorites%2F{}", vehicle.id)),
        ("GET", "/api/vehicles/..%2Fvehicles%2Fx".to_string()),
    ] {
        let (status, _) = call(&app, method, &uri, Some("user-1"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
    }
    let (status, _) = call(
        &app,
        "PUT",
        &format!("/api/saved-searches/{}", crafted),
        Some("user-1"),
        Some(json!({ "name": "taken" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, searches) = call(&app, "GET", "/api/saved-searches", Some("user-2"), None).await;
    assert_eq!(searches[0]["name"], "Mine");
    let (_, favorites) = call(&app, "GET", "/api/favorites", Some("user-2"), None).await;
    assert_eq!(favorites.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_limit_falls_back_to_default() {
    let store = Arc::new(MemoryStore::new());
    for i in 0..12 {
        store
            .record_search(NewSearchHistory {
                user_id: "user-1".into(),
                query: format!("query {}", i),
                parsed_filters: SearchFilters::default(),
                result_count: 0,
            })
            .await
            .unwrap();
    }
    let app = setup_test_app(store);

    for (uri, expected) in [
        ("/api/search/history", 10),
        ("/api/search/history?limit=0", 10),
        ("/api/search/history?limit=abc", 10),
        ("/api/search/history?limit=3", 3),
    ] {
        let (status, history) = call(&app, "GET", uri, Some("user-1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), expected, "{}", uri);
    }
}
