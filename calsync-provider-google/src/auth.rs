//! Service-account OAuth.
//!
//! A signed RS256 JWT is exchanged at the key's `token_uri` for a bearer
//! token, which is cached until shortly before it expires.

use std::fmt;

use calsync_core::{CalSyncError, CalSyncResult};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each signed assertion.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are refreshed this long before Google says they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account key file that signing needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> CalSyncResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CalSyncError::Auth(format!("Invalid service-account key: {}", e)))
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Utc::now() < self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

/// Where bearer tokens come from.
pub struct TokenSource(Source);

enum Source {
    ServiceAccount {
        key: ServiceAccountKey,
        client: Client,
        cache: Mutex<Option<CachedToken>>,
    },
    Static(String),
}

impl TokenSource {
    pub fn service_account(key: ServiceAccountKey, client: Client) -> Self {
        TokenSource(Source::ServiceAccount {
            key,
            client,
            cache: Mutex::new(None),
        })
    }

    /// A fixed token, for tests and short-lived manual runs.
    pub fn fixed(token: impl Into<String>) -> Self {
        TokenSource(Source::Static(token.into()))
    }

    /// A valid bearer token, fetching a new one if the cached one is stale.
    pub async fn access_token(&self) -> CalSyncResult<String> {
        match &self.0 {
            Source::Static(token) => Ok(token.clone()),
            Source::ServiceAccount { key, client, cache } => {
                let mut cached = cache.lock().await;
                if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
                    return Ok(token.access_token.clone());
                }

                let token = exchange(key, client).await?;
                let access_token = token.access_token.clone();
                *cached = Some(token);
                Ok(access_token)
            }
        }
    }

    /// Forget the cached token after the API rejected it.
    pub async fn invalidate(&self) {
        if let Source::ServiceAccount { cache, .. } = &self.0 {
            cache.lock().await.take();
        }
    }
}

fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> CalSyncResult<String> {
    let claims = Claims {
        iss: &key.client_email,
        scope: CALENDAR_SCOPE,
        aud: &key.token_uri,
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| CalSyncError::Auth(format!("Invalid service-account private key: {}", e)))?;

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| CalSyncError::Auth(format!("Failed to sign token request: {}", e)))
}

async fn exchange(key: &ServiceAccountKey, client: &Client) -> CalSyncResult<CachedToken> {
    let now = Utc::now();
    let assertion = sign_assertion(key, now)?;

    debug!("Requesting access token for {}", key.client_email);
    let response = client
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(|e| CalSyncError::Transport(format!("Token request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        // Rate limits and server errors stay retryable; everything else is a
        // credentials problem.
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(CalSyncError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        return Err(CalSyncError::Auth(format!(
            "Token exchange rejected (HTTP {}): {}",
            status.as_u16(),
            body
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| CalSyncError::Auth(format!("Unreadable token response: {}", e)))?;

    Ok(CachedToken {
        access_token: token.access_token,
        expires_at: now + Duration::seconds(token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS)),
    })
}
