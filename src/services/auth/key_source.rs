//! Public key material for access-token verification.
//!
//! - `StaticKey`: a PEM given in configuration (also what tests use).
//! - `RealmKeySource`: the realm key published by Keycloak at `{url}/realms/{realm}`,
//!   cached process-wide.
//!
//! Cache discipline for `RealmKeySource`:
//! - readers load the current key with a lock-free `ArcSwapOption::load_full`
//! - a single writer (guarded by `refresh`) fetches and swaps in a new key
//! - a failed refresh leaves the previous key untouched

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum KeySourceError {
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),
    #[error("identity provider returned {0}")]
    Status(reqwest::StatusCode),
    #[error("unexpected realm document: {0}")]
    Document(String),
}

#[async_trait]
pub trait KeySource: Send + Sync {
    // Current verification key. Implementations may fetch or refresh.
    async fn decoding_key(&self) -> Result<Arc<DecodingKey>, KeySourceError>;
}

/// Fixed key from configuration.
pub struct StaticKey {
    key: Arc<DecodingKey>,
}

impl StaticKey {
    pub fn from_rsa_pem(pem: &str) -> Result<Self, KeySourceError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| KeySourceError::InvalidKey(e.to_string()))?;
        Ok(Self { key: Arc::new(key) })
    }
}

#[async_trait]
impl KeySource for StaticKey {
    async fn decoding_key(&self) -> Result<Arc<DecodingKey>, KeySourceError> {
        Ok(self.key.clone())
    }
}

struct CachedKey {
    key: Arc<DecodingKey>,
    fetched_at: Instant,
}

#[derive(Debug, Deserialize)]
struct RealmDocument {
    public_key: String,
}

/// Keycloak publishes the realm key as bare base64 DER (SubjectPublicKeyInfo).
pub fn spki_base64_to_pem(der_base64: &str) -> String {
    let body: String = der_base64.split_whitespace().collect();
    let mut pem = String::from("-----BEGIN PUBLIC KEY-----\n");
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

pub struct RealmKeySource {
    http: reqwest::Client,
    realm_url: String,
    ttl: Duration,
    cached: ArcSwapOption<CachedKey>,
    refresh: Mutex<()>,
}

impl RealmKeySource {
    pub fn new(http: reqwest::Client, keycloak_url: &str, realm: &str, ttl: Duration) -> Self {
        Self {
            http,
            realm_url: format!("{}/realms/{}", keycloak_url.trim_end_matches('/'), realm),
            ttl,
            cached: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
        }
    }

    fn fresh(&self) -> Option<Arc<DecodingKey>> {
        self.cached
            .load_full()
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.key.clone())
    }

    async fn fetch(&self) -> Result<DecodingKey, KeySourceError> {
        let res = self
            .http
            .get(&self.realm_url)
            .send()
            .await
            .map_err(|e| KeySourceError::Unreachable(e.to_string()))?;

        if !res.status().is_success() {
            return Err(KeySourceError::Status(res.status()));
        }

        let doc: RealmDocument = res
            .json()
            .await
            .map_err(|e| KeySourceError::Document(e.to_string()))?;

        let pem = spki_base64_to_pem(&doc.public_key);
        DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| KeySourceError::InvalidKey(e.to_string()))
    }
}

#[async_trait]
impl KeySource for RealmKeySource {
    async fn decoding_key(&self) -> Result<Arc<DecodingKey>, KeySourceError> {
        if let Some(key) = self.fresh() {
            return Ok(key);
        }

        let _writer = self.refresh.lock().await;
        // Another task may have refreshed while we waited.
        if let Some(key) = self.fresh() {
            return Ok(key);
        }

        let key = Arc::new(self.fetch().await?);
        self.cached.store(Some(Arc::new(CachedKey {
            key: key.clone(),
            fetched_at: Instant::now(),
        })));
        tracing::info!(realm_url = %self.realm_url, "realm public key refreshed");

        Ok(key)
    }
}
