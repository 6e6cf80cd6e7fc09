/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - auth: token 検証, downloads: download token, upstream: 共有 HTTP client
 *   - directory: Keycloak admin (user 管理)
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 * - プロセス起動時に一度だけ作り、以後は読み取り専用
 */
use std::sync::Arc;

use crate::config::{Config, KeycloakConfig};
use crate::error::AppError;
use crate::services::{
    auth::{AuthService, build_auth_service},
    download_token::DownloadTokens,
    keycloak::{KeycloakAdmin, UserDirectory},
    proxy::{UpstreamClient, UpstreamUrls},
};

/// What the SPA needs to start its own login flow, plus the roles the BFF manages.
#[derive(Debug, Clone)]
pub struct IdpSettings {
    pub url: String,
    pub realm: String,
    pub client_id: String,
    pub valid_roles: Vec<String>,
}

impl IdpSettings {
    pub fn from_config(config: &KeycloakConfig) -> Self {
        Self {
            url: config.url.clone(),
            realm: config.realm.clone(),
            client_id: config.client_id.clone(),
            valid_roles: config.valid_roles.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub downloads: Arc<DownloadTokens>,
    pub upstream: UpstreamClient,
    pub upstreams: Arc<UpstreamUrls>,
    pub directory: Arc<dyn UserDirectory>,
    pub idp: Arc<IdpSettings>,
}

impl AppState {
    pub fn new(
        auth: Arc<AuthService>,
        downloads: DownloadTokens,
        upstream: UpstreamClient,
        upstreams: UpstreamUrls,
        directory: Arc<dyn UserDirectory>,
        idp: IdpSettings,
    ) -> Self {
        Self {
            auth,
            downloads: Arc::new(downloads),
            upstream,
            upstreams: Arc::new(upstreams),
            directory,
            idp: Arc::new(idp),
        }
    }

    /// Wire every dependency from configuration. Nothing here talks to the network yet.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        let auth = build_auth_service(config, upstream.http().clone())?;

        let downloads = DownloadTokens::new(&config.download_token_secret, config.download_token_ttl)
            .map_err(|_| {
                tracing::error!("DOWNLOAD_TOKEN_SECRET is not usable as an HMAC key");
                AppError::Internal
            })?;

        let directory = KeycloakAdmin::new(upstream.http().clone(), &config.keycloak)?;

        Ok(Self::new(
            auth,
            downloads,
            upstream,
            UpstreamUrls::from_config(&config.upstream),
            Arc::new(directory),
            IdpSettings::from_config(&config.keycloak),
        ))
    }
}
