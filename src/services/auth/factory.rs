/// Factory: build `AuthService` from application `Config`.
use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::services::auth::{AuthService, KeySource, RealmKeySource, StaticKey, TokenSettings};

pub fn build_auth_service(config: &Config, http: reqwest::Client) -> Result<Arc<AuthService>, AppError> {
    let kc = &config.keycloak;

    let keys: Arc<dyn KeySource> = match kc.public_key_pem.as_deref() {
        Some(pem) => {
            let key = StaticKey::from_rsa_pem(pem).map_err(|e| {
                tracing::error!(error = %e, "KEYCLOAK_PUBLIC_KEY_PEM is not a usable RSA public key");
                AppError::Internal
            })?;
            Arc::new(key)
        }
        None => Arc::new(RealmKeySource::new(
            http,
            &kc.url,
            &kc.realm,
            kc.public_key_ttl,
        )),
    };

    let settings = TokenSettings {
        verify_audience: kc.verify_audience,
        audience: kc.audience.clone(),
        leeway_seconds: kc.leeway_seconds,
    };

    Ok(Arc::new(AuthService::new(keys, &settings)))
}
