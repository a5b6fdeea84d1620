use async_trait::async_trait;
use axum::{
    RequestPartsExt,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{error, info, warn};

use crate::{error::AppError, state::AppState};

const GOOGLE_PUBLIC_KEYS_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";
const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token format")]
    Malformed,
    #[error("Token missing key identifier")]
    MissingKeyId,
    #[error("Unknown key identifier")]
    UnknownKeyId,
    #[error("Token expired")]
    Expired,
    #[error("Invalid token audience")]
    InvalidAudience,
    #[error("Invalid token issuer")]
    InvalidIssuer,
    #[error("Invalid token")]
    Invalid,
    #[error("could not load signing keys: {0}")]
    KeyFetch(String),
    #[error("firebase_project_id is not configured")]
    NotConfigured,
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::KeyFetch(_) | AuthError::NotConfigured => {
                AppError::InternalServerError(anyhow::Error::new(e).context("token verification unavailable"))
            }
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

// The caller behind a verified bearer token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
}

// Maps a bearer token to the user it was issued for.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    aud: String,
    iss: String,
    sub: String, // Firebase user id
    exp: usize,
    iat: usize,
    email: Option<String>,
}

// Structure to hold the fetched Google public keys
#[derive(Clone)]
struct GooglePublicKeys {
    keys: Arc<HashMap<String, DecodingKey>>,
    last_fetched: std::time::Instant,
    max_age: Duration,
}

// Refreshed once the Cache-Control max-age from Google has elapsed
static PUBLIC_KEYS: Lazy<tokio::sync::RwLock<Option<GooglePublicKeys>>> =
    Lazy::new(|| tokio::sync::RwLock::new(None));

fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control
        .split(',')
        .find_map(|part| part.trim().strip_prefix("max-age=").and_then(|val| val.parse::<u64>().ok()))
        .map(Duration::from_secs)
}

async fn get_google_keys(http_client: &Client) -> Result<Arc<HashMap<String, DecodingKey>>, AuthError> {
    let read_guard = PUBLIC_KEYS.read().await;
    if let Some(cache) = &*read_guard {
        if cache.last_fetched.elapsed() < cache.max_age {
            return Ok(cache.keys.clone());
        }
    }
    drop(read_guard); // Release read lock before acquiring write lock

    info!("Fetching Google public keys from {}", GOOGLE_PUBLIC_KEYS_URL);
    let response = http_client
        .get(GOOGLE_PUBLIC_KEYS_URL)
        .send()
        .await
        .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

    let max_age = response
        .headers()
        .get(reqwest::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_max_age)
        .unwrap_or_else(|| Duration::from_secs(3600)); // Default to 1 hour

    let key_map: HashMap<String, String> =
        response.json().await.map_err(|e| AuthError::KeyFetch(e.to_string()))?;

    let decoding_keys = key_map
        .into_iter()
        .filter_map(|(kid, key_pem)| match DecodingKey::from_rsa_pem(key_pem.as_bytes()) {
            Ok(key) => Some((kid, key)),
            Err(e) => {
                error!("Failed to decode public key PEM for kid {}: {}", kid, e);
                None
            }
        })
        .collect::<HashMap<_, _>>();

    if decoding_keys.is_empty() {
        return Err(AuthError::KeyFetch("no usable keys in Google's response".into()));
    }

    let keys_arc = Arc::new(decoding_keys);
    *PUBLIC_KEYS.write().await = Some(GooglePublicKeys {
        keys: keys_arc.clone(),
        last_fetched: std::time::Instant::now(),
        max_age,
    });
    info!("Cached {} Google public keys. Max-age: {:?}", keys_arc.len(), max_age);

    Ok(keys_arc)
}

// Verifies Firebase ID tokens (RS256) against Google's published keys.
pub struct FirebaseIdentityResolver {
    http_client: Arc<Client>,
    project_id: Option<String>,
}

impl FirebaseIdentityResolver {
    pub fn new(http_client: Arc<Client>, project_id: Option<String>) -> Self {
        Self { http_client, project_id }
    }
}

#[async_trait]
impl IdentityResolver for FirebaseIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        let header = decode_header(token).map_err(|e| {
            warn!("Invalid JWT header: {}", e);
            AuthError::Malformed
        })?;
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
        let project_id = self.project_id.as_deref().ok_or(AuthError::NotConfigured)?;

        let keys = get_google_keys(&self.http_client).await?;
        let decoding_key = keys.get(&kid).ok_or_else(|| {
            warn!("Unknown 'kid' {} found in token header", kid);
            AuthError::UnknownKeyId
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[project_id]);
        validation.set_issuer(&[format!("{}{}", FIREBASE_ISSUER_PREFIX, project_id)]);

        let decoded = decode::<Claims>(token, decoding_key, &validation).map_err(|e| {
            warn!("Token validation failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::InvalidAudience,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                _ => AuthError::Invalid,
            }
        })?;

        Ok(Identity { user_id: decoded.claims.sub, email: decoded.claims.email })
    }
}

// --- Axum Extractor ---

// Extracted in handlers that require a signed-in user.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|e| {
                warn!("Failed to extract Authorization header: {}", e);
                AppError::Unauthorized("Missing or invalid Authorization header".into())
            })?;

        let app_state = AppState::from_ref(state);
        let identity = app_state.identity.resolve(bearer.token()).await?;
        tracing::debug!(user_id = %identity.user_id, "Request authenticated");
        Ok(AuthenticatedUser(identity))
    }
}
