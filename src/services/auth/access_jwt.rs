use jsonwebtoken::{Algorithm, Validation};
use serde_json::{Map, Value};
use std::{error::Error as StdError, fmt, sync::Arc};

use crate::api::extractors::IdentityContext;
use crate::error::AppError;
use crate::services::auth::claims::{self, ClaimsError};
use crate::services::auth::key_source::{KeySource, KeySourceError};

// Errors returned by access-token verification.
#[derive(Debug)]
pub enum TokenError {
    Jwt(jsonwebtoken::errors::Error),
    KeyUnavailable(KeySourceError),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jwt(e) => write!(f, "jwt verification failed: {}", e),
            Self::KeyUnavailable(e) => write!(f, "verification key unavailable: {}", e),
        }
    }
}

impl StdError for TokenError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Jwt(e) => Some(e),
            Self::KeyUnavailable(e) => Some(e),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Self::Jwt(e)
    }
}

impl From<KeySourceError> for TokenError {
    fn from(e: KeySourceError) -> Self {
        Self::KeyUnavailable(e)
    }
}

/// Token validation outcome that the HTTP boundary maps to 401 / 400.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Claims(#[from] ClaimsError),
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::Token(e) => AppError::Unauthorized(e.to_string()),
            ValidationError::Claims(e) => e.into(),
        }
    }
}

/// Verification knobs.
///
/// Audience checking is off unless explicitly enabled: the Keycloak clients this BFF
/// is deployed against do not put the BFF in `aud`.
#[derive(Debug, Clone, Default)]
pub struct TokenSettings {
    pub verify_audience: bool,
    pub audience: Option<String>,
    pub leeway_seconds: u64,
}

/// RS*/PS* access-token verifier against the identity provider's realm key.
///
/// - Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct AuthService {
    keys: Arc<dyn KeySource>,
    validation: Validation,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("validation", &self.validation)
            .finish()
    }
}

impl AuthService {
    pub fn new(keys: Arc<dyn KeySource>, settings: &TokenSettings) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = vec![
            Algorithm::RS256,
            Algorithm::RS384,
            Algorithm::RS512,
            Algorithm::PS256,
            Algorithm::PS384,
            Algorithm::PS512,
        ];
        validation.set_required_spec_claims(&["exp"]);
        validation.validate_exp = true;
        validation.leeway = settings.leeway_seconds;

        validation.validate_aud = settings.verify_audience;
        if let Some(aud) = settings.audience.as_deref().filter(|_| settings.verify_audience) {
            validation.set_audience(&[aud]);
        }

        Self { keys, validation }
    }

    // Verify signature + exp (+ aud when enabled) and return the raw claims.
    pub async fn verify(&self, token: &str) -> Result<Map<String, Value>, TokenError> {
        let key = self.keys.decoding_key().await?;
        let data = jsonwebtoken::decode::<Map<String, Value>>(token, &key, &self.validation)?;
        Ok(data.claims)
    }

    /// Verify, then map the claims into an [`IdentityContext`].
    ///
    /// This is the entry-point for middleware.
    pub async fn validate(&self, token: &str) -> Result<IdentityContext, ValidationError> {
        let claims = self.verify(token).await?;
        Ok(claims::extract(&claims)?)
    }
}
