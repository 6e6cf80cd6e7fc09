//! Keycloak Admin REST API client.
//!
//! Authenticates as the BFF's confidential client (`client_credentials`) and keeps the
//! service token until shortly before it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use url::Url;

use crate::config::KeycloakConfig;
use crate::services::keycloak::directory::{
    DirectoryError, DirectoryResult, DirectoryUser, RealmRole, UserDirectory,
};

// Role member listings are paged by Keycloak (default 100).
const MEMBER_PAGE: u64 = 100;
// Renew the service token this long before Keycloak would reject it.
const TOKEN_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct ServiceToken {
    access_token: String,
    expires_at: Instant,
}

pub struct KeycloakAdmin {
    http: reqwest::Client,
    base: Url,
    realm: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<ServiceToken>>,
}

impl std::fmt::Debug for KeycloakAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakAdmin")
            .field("base", &self.base.as_str())
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl KeycloakAdmin {
    pub fn new(http: reqwest::Client, config: &KeycloakConfig) -> DirectoryResult<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| DirectoryError::Unreachable(format!("{}: {}", config.url, e)))?;

        Ok(Self {
            http,
            base,
            realm: config.realm.clone(),
            client_id: config.bff_client_id.clone(),
            client_secret: config.bff_client_secret.clone(),
            token: Mutex::new(None),
        })
    }

    fn url(&self, segments: &[&str]) -> DirectoryResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::Unreachable(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn admin_url(&self, segments: &[&str]) -> DirectoryResult<Url> {
        let mut all = vec!["admin", "realms", self.realm.as_str()];
        all.extend_from_slice(segments);
        self.url(&all)
    }

    async fn access_token(&self) -> DirectoryResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.access_token.clone());
        }

        let url = self.url(&["realms", &self.realm, "protocol", "openid-connect", "token"])?;
        let res = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;

        if matches!(res.status(), StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            return Err(DirectoryError::Credentials);
        }
        let res = check(res, "service token").await?;
        let body: TokenResponse = res
            .json()
            .await
            .map_err(|e| DirectoryError::Payload(e.to_string()))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_SLACK);
        *cached = Some(ServiceToken {
            access_token: body.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        tracing::debug!(client_id = %self.client_id, "keycloak service token refreshed");

        Ok(body.access_token)
    }

    async fn request(&self, method: Method, url: Url) -> DirectoryResult<reqwest::RequestBuilder> {
        let token = self.access_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
        resource: &'static str,
    ) -> DirectoryResult<T> {
        let res = self
            .request(Method::GET, url)
            .await?
            .query(query)
            .send()
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;

        check(res, resource)
            .await?
            .json()
            .await
            .map_err(|e| DirectoryError::Payload(e.to_string()))
    }

    async fn send_roles(&self, method: Method, user_id: &str, roles: &[RealmRole]) -> DirectoryResult<()> {
        if roles.is_empty() {
            return Ok(());
        }
        let url = self.admin_url(&["users", user_id, "role-mappings", "realm"])?;
        let res = self
            .request(method, url)
            .await?
            .json(roles)
            .send()
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;

        check(res, "user").await?;
        Ok(())
    }
}

async fn check(res: reqwest::Response, resource: &'static str) -> DirectoryResult<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(DirectoryError::NotFound(resource));
    }
    let detail = res.text().await.unwrap_or_default();
    Err(DirectoryError::Status { status, detail })
}

fn username_query(username: Option<&str>) -> Vec<(&'static str, String)> {
    username
        .filter(|u| !u.is_empty())
        .map(|u| vec![("username", u.to_string())])
        .unwrap_or_default()
}

#[async_trait]
impl UserDirectory for KeycloakAdmin {
    async fn get_user(&self, user_id: &str) -> DirectoryResult<DirectoryUser> {
        let url = self.admin_url(&["users", user_id])?;
        self.get_json(url, &[], "user").await
    }

    async fn list_users(
        &self,
        first: u64,
        max: u64,
        username: Option<&str>,
    ) -> DirectoryResult<Vec<DirectoryUser>> {
        let url = self.admin_url(&["users"])?;
        let mut query = vec![("first", first.to_string()), ("max", max.to_string())];
        query.extend(username_query(username));
        self.get_json(url, &query, "users").await
    }

    async fn count_users(&self, username: Option<&str>) -> DirectoryResult<u64> {
        let url = self.admin_url(&["users", "count"])?;
        self.get_json(url, &username_query(username), "users").await
    }

    async fn role_members(&self, role: &str) -> DirectoryResult<Vec<DirectoryUser>> {
        let url = self.admin_url(&["roles", role, "users"])?;
        let mut members = Vec::new();
        let mut first = 0;
        loop {
            let query = [("first", first.to_string()), ("max", MEMBER_PAGE.to_string())];
            let page: Vec<DirectoryUser> = self.get_json(url.clone(), &query, "role").await?;
            let len = page.len() as u64;
            members.extend(page);
            if len < MEMBER_PAGE {
                return Ok(members);
            }
            first += MEMBER_PAGE;
        }
    }

    async fn user_realm_roles(&self, user_id: &str) -> DirectoryResult<Vec<RealmRole>> {
        let url = self.admin_url(&["users", user_id, "role-mappings", "realm"])?;
        self.get_json(url, &[], "user").await
    }

    async fn realm_role(&self, name: &str) -> DirectoryResult<RealmRole> {
        let url = self.admin_url(&["roles", name])?;
        self.get_json(url, &[], "role").await
    }

    async fn assign_realm_roles(&self, user_id: &str, roles: &[RealmRole]) -> DirectoryResult<()> {
        self.send_roles(Method::POST, user_id, roles).await
    }

    async fn remove_realm_roles(&self, user_id: &str, roles: &[RealmRole]) -> DirectoryResult<()> {
        self.send_roles(Method::DELETE, user_id, roles).await
    }
}
