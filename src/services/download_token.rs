//! Signed download tokens (HMAC-SHA256).
//!
//! A token authorises "whoever holds this link until `exp` may fetch exactly this file".
//! It carries no identity; the issuing endpoint checks access before minting it.
//!
//! Wire format: `base64url(payload_json) "." base64url(hmac_sha256(secret, payload_segment))`
//! - the MAC covers the encoded payload segment byte-for-byte
//! - signature is checked before the payload is even parsed

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac, digest::InvalidLength};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DownloadTokenError {
    #[error("invalid download token")]
    Invalid,
    #[error("download token expired")]
    Expired,
}

impl From<DownloadTokenError> for AppError {
    fn from(e: DownloadTokenError) -> Self {
        match e {
            DownloadTokenError::Invalid => AppError::Unauthorized(e.to_string()),
            DownloadTokenError::Expired => AppError::Expired(e.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    rid: Uuid,
    fname: String,
    exp: i64,
}

/// An issued token plus what it binds.
#[derive(Debug, Clone)]
pub struct DownloadToken {
    pub token: String,
    pub resource_id: Uuid,
    pub filename: String,
    pub expires_at: DateTime<Utc>,
}

/// What a verified token grants access to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadGrant {
    pub resource_id: Uuid,
    pub filename: String,
}

/// Secret material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct DownloadTokens {
    mac: HmacSha256,
    ttl: Duration,
}

impl std::fmt::Debug for DownloadTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTokens")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl DownloadTokens {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_ref())?,
            ttl,
        })
    }

    /// Default horizon for links minted by the API.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(
        &self,
        resource_id: Uuid,
        filename: &str,
        ttl: Duration,
    ) -> Result<DownloadToken, AppError> {
        self.issue_at(resource_id, filename, ttl, Utc::now())
    }

    pub fn issue_at(
        &self,
        resource_id: Uuid,
        filename: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<DownloadToken, AppError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| AppError::Internal)?;
        let expires_at = now + ttl;

        let payload = Payload {
            rid: resource_id,
            fname: filename.to_string(),
            exp: expires_at.timestamp(),
        };
        let json = serde_json::to_vec(&payload).map_err(|e| {
            tracing::error!(error = %e, "failed to encode download token payload");
            AppError::Internal
        })?;

        let payload_segment = URL_SAFE_NO_PAD.encode(json);
        let mut mac = self.mac.clone();
        mac.update(payload_segment.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(DownloadToken {
            token: format!("{}.{}", payload_segment, signature),
            resource_id,
            filename: filename.to_string(),
            expires_at: Utc
                .timestamp_opt(payload.exp, 0)
                .single()
                .ok_or(AppError::Internal)?,
        })
    }

    pub fn verify(&self, token: &str) -> Result<DownloadGrant, DownloadTokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Signature first (`Invalid`), then expiry (`Expired`).
    pub fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<DownloadGrant, DownloadTokenError> {
        let (payload_segment, signature_segment) = token
            .split_once('.')
            .ok_or(DownloadTokenError::Invalid)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_segment)
            .map_err(|_| DownloadTokenError::Invalid)?;

        let mut mac = self.mac.clone();
        mac.update(payload_segment.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| DownloadTokenError::Invalid)?;

        let payload: Payload = URL_SAFE_NO_PAD
            .decode(payload_segment)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or(DownloadTokenError::Invalid)?;

        if now.timestamp() >= payload.exp {
            return Err(DownloadTokenError::Expired);
        }

        Ok(DownloadGrant {
            resource_id: payload.rid,
            filename: payload.fname,
        })
    }
}
