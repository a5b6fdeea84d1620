// Store backed by Google Cloud Firestore (REST API)

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use std::{collections::HashMap, env, sync::Arc, time::Duration, time::Instant};
use tokio::sync::RwLock;
use yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};

use super::{StoreError, StoreResult, UserDataStore, VehicleQuery, VehicleStore, apply_update, is_document_id};
use crate::models::{
    Favorite, NewSavedSearch, NewSearchHistory, NewVehicle, SavedSearch, SavedSearchUpdate,
    SearchHistoryRecord, VehicleListing,
};

const FIRESTORE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/datastore", // Firestore scope
    "https://www.googleapis.com/auth/cloud-platform", // General cloud scope
];

// Google access tokens live for an hour
const TOKEN_MAX_AGE: Duration = Duration::from_secs(50 * 60);

// Fields stored as Firestore timestamps so they order correctly
const TIMESTAMP_FIELDS: [&str; 5] = ["createdAt", "updatedAt", "lastRunAt", "auctionDate", "auctionEndDate"];

// Listing documents fetched per runQuery page before substring filters apply
const VEHICLE_PAGE_SIZE: usize = 300;
const SAVED_SEARCH_PAGE_SIZE: usize = 300;

// --- Firestore Response Structures ---

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct FirestoreValue {
    string_value: Option<String>,
    integer_value: Option<String>, // Firestore integers are sent as strings
    double_value: Option<f64>,
    boolean_value: Option<bool>,
    timestamp_value: Option<String>,
    array_value: Option<FirestoreArrayValue>,
    map_value: Option<FirestoreMapValue>,
}

#[derive(Deserialize, Debug, Default)]
struct FirestoreArrayValue {
    #[serde(default)]
    values: Vec<FirestoreValue>,
}

#[derive(Deserialize, Debug, Default)]
struct FirestoreMapValue {
    #[serde(default)]
    fields: HashMap<String, FirestoreValue>,
}

#[derive(Deserialize, Debug)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: HashMap<String, FirestoreValue>,
}

#[derive(Deserialize, Debug)]
struct ListDocumentsResponse {
    documents: Option<Vec<FirestoreDocument>>,
}

#[derive(Deserialize, Debug)]
struct RunQueryResponseItem {
    document: Option<FirestoreDocument>,
}

// --- Firestore (De)serialization Helpers ---

fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(to_firestore_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => {
            let fields: Map<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), to_firestore_value(v))).collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

fn from_firestore_value(value: &FirestoreValue) -> Value {
    if let Some(s) = &value.string_value {
        return Value::String(s.clone());
    }
    if let Some(i) = &value.integer_value {
        return i.parse::<i64>().map(Value::from).unwrap_or(Value::Null);
    }
    if let Some(d) = value.double_value {
        return Value::from(d);
    }
    if let Some(b) = value.boolean_value {
        return Value::Bool(b);
    }
    if let Some(ts) = &value.timestamp_value {
        return Value::String(ts.clone());
    }
    if let Some(array) = &value.array_value {
        return Value::Array(array.values.iter().map(from_firestore_value).collect());
    }
    if let Some(map) = &value.map_value {
        return Value::Object(
            map.fields.iter().map(|(k, v)| (k.clone(), from_firestore_value(v))).collect(),
        );
    }
    Value::Null
}

// Serializes a record into a Firestore document body. The `id` field is
// carried by the document name instead.
fn to_document<T: Serialize>(record: &T) -> StoreResult<Value> {
    let value = serde_json::to_value(record).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(StoreError::Corrupt("record did not serialize to an object".into()));
    };

    let fields: Map<String, Value> = map
        .iter()
        .filter(|(k, _)| k.as_str() != "id")
        .map(|(k, v)| {
            let encoded = match v {
                Value::String(ts) if TIMESTAMP_FIELDS.contains(&k.as_str()) => {
                    json!({ "timestampValue": ts })
                }
                other => to_firestore_value(other),
            };
            (k.clone(), encoded)
        })
        .collect();

    Ok(json!({ "fields": fields }))
}

fn from_document<T: DeserializeOwned>(doc: &FirestoreDocument) -> StoreResult<T> {
    let mut map: Map<String, Value> = doc
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), from_firestore_value(v)))
        .collect();
    let id = extract_doc_id(&doc.name)
        .ok_or_else(|| StoreError::Corrupt(format!("unusable document name {}", doc.name)))?;
    map.insert("id".to_string(), Value::String(id));

    serde_json::from_value(Value::Object(map))
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", doc.name, e)))
}

// Helper to extract document ID from the full name path
fn extract_doc_id(name: &str) -> Option<String> {
    name.rsplit('/').next().filter(|s| !s.is_empty()).map(|s| s.to_string())
}

// Deterministic listing document id, so a second insert collides.
fn vehicle_doc_id(source: &str, external_id: &str) -> String {
    format!("{}-{}", source, external_id).replace('/', "_")
}

fn field_equals(field: &str, value: Value) -> Value {
    json!({
        "fieldFilter": {
            "field": { "fieldPath": field },
            "op": "EQUAL",
            "value": to_firestore_value(&value),
        }
    })
}

// Appends each segment percent-encoded, so an id can never climb out of its parent
fn document_url(base: &Url, segments: &[&str]) -> StoreResult<Url> {
    if let Some(bad) = segments.iter().find(|s| !is_document_id(s)) {
        return Err(StoreError::InvalidId(bad.to_string()));
    }
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| StoreError::Backend(format!("{} cannot be a base URL", base)))?
        .extend(segments);
    Ok(url)
}

// Server-side part of a listing query; the rest runs through VehicleQuery::matches
fn vehicle_where_clause(query: &VehicleQuery) -> Value {
    let mut filters = vec![field_equals("isActive", Value::Bool(true))];
    if let Some(source) = &query.source {
        filters.push(field_equals("source", Value::String(source.clone())));
    }
    if let Some(external_id) = &query.external_id {
        filters.push(field_equals("externalId", Value::String(external_id.clone())));
    }
    if filters.len() == 1 {
        filters.remove(0)
    } else {
        json!({ "compositeFilter": { "op": "AND", "filters": filters } })
    }
}

// Newest first, document name breaking createdAt ties so cursors are stable
fn vehicle_page_query(where_clause: &Value, start_after: Option<&Value>) -> Value {
    let mut structured = json!({
        "from": [{ "collectionId": "vehicles" }],
        "where": where_clause,
        "orderBy": [
            { "field": { "fieldPath": "createdAt" }, "direction": "DESCENDING" },
            { "field": { "fieldPath": "__name__" }, "direction": "DESCENDING" },
        ],
        "limit": VEHICLE_PAGE_SIZE,
    });
    if let Some(cursor) = start_after {
        structured["startAt"] = cursor.clone();
    }
    json!({ "structuredQuery": structured })
}

fn cursor_after(doc: &FirestoreDocument) -> StoreResult<Value> {
    let created_at = doc
        .fields
        .get("createdAt")
        .and_then(|v| v.timestamp_value.as_ref())
        .ok_or_else(|| StoreError::Corrupt(format!("{} has no createdAt timestamp", doc.name)))?;
    Ok(json!({
        "values": [{ "timestampValue": created_at }, { "referenceValue": doc.name }],
        "before": false,
    }))
}

async fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Backend(format!("Firestore returned {}: {}", status, body)))
}

struct CachedToken {
    value: String,
    fetched: Instant,
}

pub struct FirestoreStore {
    http_client: Arc<Client>,
    documents_url: Url,
    service_account: ServiceAccountKey,
    token: RwLock<Option<CachedToken>>,
}

impl FirestoreStore {
    // Reads the service account key from GOOGLE_APPLICATION_CREDENTIALS.
    pub async fn from_env(http_client: Arc<Client>, project_id: &str) -> anyhow::Result<Self> {
        use anyhow::Context;

        let creds_path = env::var("GOOGLE_APPLICATION_CREDENTIALS")
            .context("GOOGLE_APPLICATION_CREDENTIALS environment variable not set")?;
        let service_account = yup_oauth2::read_service_account_key(&creds_path)
            .await
            .context("Failed to read service account key file")?;

        let documents_url = Url::parse(&format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents",
            project_id
        ))
        .context("Invalid Firestore project id")?;

        Ok(Self {
            http_client,
            documents_url,
            service_account,
            token: RwLock::new(None),
        })
    }

    async fn bearer_token(&self) -> StoreResult<String> {
        if let Some(cached) = &*self.token.read().await {
            if cached.fetched.elapsed() < TOKEN_MAX_AGE {
                return Ok(cached.value.clone());
            }
        }

        tracing::debug!("Fetching Firestore access token");
        let auth = ServiceAccountAuthenticator::builder(self.service_account.clone())
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("service account authenticator: {}", e)))?;
        let token = auth
            .token(&FIRESTORE_SCOPES)
            .await
            .map_err(|e| StoreError::Backend(format!("OAuth2 token: {}", e)))?;
        let value = token
            .token()
            .ok_or_else(|| StoreError::Backend("Token string is empty".into()))?
            .to_string();

        *self.token.write().await = Some(CachedToken { value: value.clone(), fetched: Instant::now() });
        Ok(value)
    }

    fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        document_url(&self.documents_url, segments)
    }

    async fn get_document(&self, path: &[&str]) -> StoreResult<Option<FirestoreDocument>> {
        let response = self
            .http_client
            .get(self.url(path)?)
            .bearer_auth(self.bearer_token().await?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc = check_status(response).await?.json::<FirestoreDocument>().await?;
        Ok(Some(doc))
    }

    // Creates a document; `document_id: None` lets Firestore assign one.
    // Returns `Ok(None)` when the id is already taken.
    async fn create_document(
        &self,
        collection: &[&str],
        document_id: Option<&str>,
        body: &Value,
    ) -> StoreResult<Option<FirestoreDocument>> {
        let mut request = self
            .http_client
            .post(self.url(collection)?)
            .bearer_auth(self.bearer_token().await?)
            .json(body);
        if let Some(id) = document_id {
            request = request.query(&[("documentId", id)]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(None);
        }
        let doc = check_status(response).await?.json::<FirestoreDocument>().await?;
        Ok(Some(doc))
    }

    async fn list_documents(&self, collection: &[&str], page_size: usize) -> StoreResult<Vec<FirestoreDocument>> {
        let response = self
            .http_client
            .get(self.url(collection)?)
            .bearer_auth(self.bearer_token().await?)
            .query(&[("orderBy", "createdAt desc".to_string()), ("pageSize", page_size.to_string())])
            .send()
            .await?;
        let list = check_status(response).await?.json::<ListDocumentsResponse>().await?;
        Ok(list.documents.unwrap_or_default())
    }

    // Deletes only if present; returns whether a document was removed.
    async fn delete_document(&self, path: &[&str]) -> StoreResult<bool> {
        let response = self
            .http_client
            .delete(self.url(path)?)
            .bearer_auth(self.bearer_token().await?)
            .query(&[("currentDocument.exists", "true")])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }

    async fn run_query(&self, body: &Value) -> StoreResult<Vec<FirestoreDocument>> {
        let response = self
            .http_client
            .post(format!("{}:runQuery", self.documents_url))
            .bearer_auth(self.bearer_token().await?)
            .json(body)
            .send()
            .await?;
        let items = check_status(response).await?.json::<Vec<RunQueryResponseItem>>().await?;
        Ok(items.into_iter().filter_map(|item| item.document).collect())
    }
}

#[async_trait]
impl VehicleStore for FirestoreStore {
    async fn query_vehicles(&self, query: &VehicleQuery) -> StoreResult<Vec<VehicleListing>> {
        let where_clause = vehicle_where_clause(query);
        let mut vehicles = Vec::new();
        let mut cursor: Option<Value> = None;

        // Page newest first until enough listings match or the collection runs out
        loop {
            let docs = self.run_query(&vehicle_page_query(&where_clause, cursor.as_ref())).await?;
            for doc in &docs {
                match from_document::<VehicleListing>(doc) {
                    Ok(v) if query.matches(&v) => vehicles.push(v),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Skipping unreadable vehicle document"),
                }
            }

            if vehicles.len() >= query.limit || docs.len() < VEHICLE_PAGE_SIZE {
                break;
            }
            match docs.last() {
                Some(last) => cursor = Some(cursor_after(last)?),
                None => break,
            }
        }

        vehicles.truncate(query.limit);
        Ok(vehicles)
    }

    async fn insert_vehicle(&self, vehicle: NewVehicle) -> StoreResult<VehicleListing> {
        let doc_id = vehicle_doc_id(&vehicle.source, &vehicle.external_id);
        let record = VehicleListing::from_new(doc_id.clone(), vehicle, Utc::now());
        let body = to_document(&record)?;

        match self.create_document(&["vehicles"], Some(&doc_id), &body).await? {
            Some(doc) => from_document(&doc),
            None => Err(StoreError::Conflict { marketplace: record.source, external_id: record.external_id }),
        }
    }

    async fn get_vehicle(&self, id: &str) -> StoreResult<Option<VehicleListing>> {
        match self.get_document(&["vehicles", id]).await? {
            Some(doc) => Ok(Some(from_document(&doc)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserDataStore for FirestoreStore {
    async fn record_search(&self, record: NewSearchHistory) -> StoreResult<SearchHistoryRecord> {
        let stored = SearchHistoryRecord {
            id: String::new(),
            user_id: record.user_id,
            query: record.query,
            parsed_filters: record.parsed_filters,
            result_count: record.result_count,
            created_at: Utc::now(),
        };
        let doc = self
            .create_document(&["users", stored.user_id.as_str(), "searchHistory"], None, &to_document(&stored)?)
            .await?
            .ok_or_else(|| StoreError::Backend("auto-id document collided".into()))?;
        from_document(&doc)
    }

    async fn search_history(&self, user_id: &str, limit: usize) -> StoreResult<Vec<SearchHistoryRecord>> {
        let docs = self.list_documents(&["users", user_id, "searchHistory"], limit).await?;
        docs.iter().map(from_document).collect()
    }

    async fn create_saved_search(&self, search: NewSavedSearch) -> StoreResult<SavedSearch> {
        let stored = SavedSearch {
            id: String::new(),
            user_id: search.user_id,
            name: search.name,
            query: search.query,
            parsed_filters: search.parsed_filters,
            alerts_enabled: search.alerts_enabled,
            last_run_at: None,
            created_at: Utc::now(),
        };
        let doc = self
            .create_document(&["users", stored.user_id.as_str(), "savedSearches"], None, &to_document(&stored)?)
            .await?
            .ok_or_else(|| StoreError::Backend("auto-id document collided".into()))?;
        let saved: SavedSearch = from_document(&doc)?;
        tracing::info!(id = %saved.id, "Saved search created");
        Ok(saved)
    }

    async fn saved_searches(&self, user_id: &str) -> StoreResult<Vec<SavedSearch>> {
        let docs = self
            .list_documents(&["users", user_id, "savedSearches"], SAVED_SEARCH_PAGE_SIZE)
            .await?;
        docs.iter().map(from_document).collect()
    }

    async fn get_saved_search(&self, user_id: &str, id: &str) -> StoreResult<Option<SavedSearch>> {
        match self.get_document(&["users", user_id, "savedSearches", id]).await? {
            Some(doc) => Ok(Some(from_document(&doc)?)),
            None => Ok(None),
        }
    }

    async fn update_saved_search(
        &self,
        user_id: &str,
        id: &str,
        update: SavedSearchUpdate,
    ) -> StoreResult<Option<SavedSearch>> {
        let Some(mut search) = self.get_saved_search(user_id, id).await? else {
            return Ok(None);
        };
        apply_update(&mut search, update);

        let response = self
            .http_client
            .patch(self.url(&["users", user_id, "savedSearches", id])?)
            .bearer_auth(self.bearer_token().await?)
            .query(&[("currentDocument.exists", "true")])
            .json(&to_document(&search)?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc = check_status(response).await?.json::<FirestoreDocument>().await?;
        Ok(Some(from_document(&doc)?))
    }

    async fn delete_saved_search(&self, user_id: &str, id: &str) -> StoreResult<bool> {
        self.delete_document(&["users", user_id, "savedSearches", id]).await
    }

    async fn add_favorite(&self, user_id: &str, vehicle_id: &str) -> StoreResult<Favorite> {
        let favorite = Favorite {
            user_id: user_id.to_string(),
            vehicle_id: vehicle_id.to_string(),
            created_at: Utc::now(),
        };
        let collection = ["users", user_id, "favorites"];
        match self
            .create_document(&collection, Some(vehicle_id), &to_document(&favorite)?)
            .await?
        {
            Some(doc) => from_document(&doc),
            None => {
                let existing = self
                    .get_document(&["users", user_id, "favorites", vehicle_id])
                    .await?
                    .ok_or_else(|| StoreError::Backend("favorite vanished after conflict".into()))?;
                from_document(&existing)
            }
        }
    }

    async fn remove_favorite(&self, user_id: &str, vehicle_id: &str) -> StoreResult<bool> {
        self.delete_document(&["users", user_id, "favorites", vehicle_id]).await
    }

    async fn favorites(&self, user_id: &str) -> StoreResult<Vec<VehicleListing>> {
        let docs = self
            .list_documents(&["users", user_id, "favorites"], SAVED_SEARCH_PAGE_SIZE)
            .await?;
        let favorites: Vec<Favorite> = docs.iter().map(from_document).collect::<StoreResult<_>>()?;

        let lookups = favorites.iter().map(|f| self.get_vehicle(&f.vehicle_id));
        let mut vehicles = Vec::with_capacity(favorites.len());
        for result in join_all(lookups).await {
            // favorites pointing at missing listings are dropped
            if let Some(vehicle) = result? {
                vehicles.push(vehicle);
            }
        }
        Ok(vehicles)
    }
}
