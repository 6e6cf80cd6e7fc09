#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    http::{HeaderValue, Request, header},
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Map, Value, json};
use url::Url;

use eceo_bff::{
    app::build_router,
    config::{AppEnv, Config, KeycloakConfig, UpstreamConfig},
    services::{
        auth::build_auth_service,
        download_token::DownloadTokens,
        keycloak::{
            DirectoryUser, RealmRole, UserDirectory,
            directory::{DirectoryError, DirectoryResult},
        },
        proxy::{UpstreamClient, UpstreamUrls},
    },
    state::{AppState, IdpSettings},
};

pub const REALM_PRIVATE: &str = include_str!("../fixtures/realm_private.pem");
pub const REALM_PUBLIC: &str = include_str!("../fixtures/realm_public.pem");
pub const REALM_PUBLIC_B64: &str = include_str!("../fixtures/realm_public.b64");
pub const OTHER_PRIVATE: &str = include_str!("../fixtures/other_private.pem");

pub const SUBJECT: &str = "5f0c3a4e-1111-4222-8333-944455556666";
pub const DOWNLOAD_SECRET: &str = "integration-download-secret";

// ---- tokens ---------------------------------------------------------------

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn claims(roles: &[&str], exp: i64) -> Value {
    json!({
        "sub": SUBJECT,
        "preferred_username": "jdoe",
        "email": "jdoe@example.org",
        "given_name": "Jane",
        "family_name": "Doe",
        "iat": now(),
        "exp": exp,
        "realm_access": { "roles": roles },
    })
}

pub fn mint_with(private_pem: &str, claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

pub fn token(roles: &[&str]) -> String {
    mint_with(REALM_PRIVATE, &claims(roles, now() + 300))
}

pub fn bearer(roles: &[&str]) -> String {
    format!("Bearer {}", token(roles))
}

// ---- servers --------------------------------------------------------------

pub async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Upstream that answers every request with a JSON description of what it received.
///
/// List responses carry `Content-Range` unless the query contains `omit_range`.
pub fn echo_upstream() -> Router {
    Router::new().fallback(echo)
}

async fn echo(req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();

    let mut headers = Map::new();
    for (name, value) in &parts.headers {
        let entry = headers
            .entry(name.as_str().to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = entry {
            values.push(Value::String(value.to_str().unwrap_or_default().to_string()));
        }
    }

    let mut res = Json(json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&bytes),
    }))
    .into_response();

    let omit = parts.uri.query().is_some_and(|q| q.contains("omit_range"));
    if !omit {
        res.headers_mut()
            .insert(header::CONTENT_RANGE, HeaderValue::from_static("items 0-0/1"));
    }
    res
}

/// First value the echo upstream saw for `name`.
pub fn echoed_header<'a>(echo: &'a Value, name: &str) -> Option<&'a str> {
    echo["headers"][name][0].as_str()
}

pub fn echoed_header_count(echo: &Value, name: &str) -> usize {
    echo["headers"][name].as_array().map(Vec::len).unwrap_or(0)
}

pub async fn body_bytes(res: Response) -> bytes::Bytes {
    res.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(res: Response) -> Value {
    serde_json::from_slice(&body_bytes(res).await).unwrap()
}

// ---- user directory -------------------------------------------------------

#[derive(Debug, Default)]
struct DirectoryData {
    users: Vec<DirectoryUser>,
    realm_roles: Vec<RealmRole>,
    mappings: HashMap<String, Vec<RealmRole>>,
}

/// In-memory realm: users, realm roles and direct role mappings.
#[derive(Debug, Default)]
pub struct FakeDirectory {
    data: Mutex<DirectoryData>,
}

impl FakeDirectory {
    pub fn with_roles(names: &[&str]) -> Self {
        let dir = Self::default();
        dir.data.lock().unwrap().realm_roles = names
            .iter()
            .map(|n| RealmRole {
                id: format!("role-{}", n),
                name: n.to_string(),
            })
            .collect();
        dir
    }

    pub fn add_user(&self, id: &str, username: &str, roles: &[&str]) {
        let mut data = self.data.lock().unwrap();
        data.users.push(DirectoryUser {
            id: id.to_string(),
            username: username.to_string(),
            email: Some(format!("{}@example.org", username)),
            ..Default::default()
        });
        let mapped = roles
            .iter()
            .map(|n| RealmRole {
                id: format!("role-{}", n),
                name: n.to_string(),
            })
            .collect();
        data.mappings.insert(id.to_string(), mapped);
    }

    pub fn role_names(&self, user_id: &str) -> Vec<String> {
        let data = self.data.lock().unwrap();
        let mut names: Vec<String> = data
            .mappings
            .get(user_id)
            .map(|roles| roles.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn matches(user: &DirectoryUser, username: Option<&str>) -> bool {
    username.is_none_or(|q| user.username.contains(q))
}

#[async_trait]
impl UserDirectory for FakeDirectory {
    async fn get_user(&self, user_id: &str) -> DirectoryResult<DirectoryUser> {
        let data = self.data.lock().unwrap();
        data.users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(DirectoryError::NotFound("user"))
    }

    async fn list_users(
        &self,
        first: u64,
        max: u64,
        username: Option<&str>,
    ) -> DirectoryResult<Vec<DirectoryUser>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .users
            .iter()
            .filter(|u| matches(u, username))
            .skip(first as usize)
            .take(max as usize)
            .cloned()
            .collect())
    }

    async fn count_users(&self, username: Option<&str>) -> DirectoryResult<u64> {
        let data = self.data.lock().unwrap();
        Ok(data.users.iter().filter(|u| matches(u, username)).count() as u64)
    }

    async fn role_members(&self, role: &str) -> DirectoryResult<Vec<DirectoryUser>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .users
            .iter()
            .filter(|u| {
                data.mappings
                    .get(&u.id)
                    .is_some_and(|roles| roles.iter().any(|r| r.name == role))
            })
            .cloned()
            .collect())
    }

    async fn user_realm_roles(&self, user_id: &str) -> DirectoryResult<Vec<RealmRole>> {
        let data = self.data.lock().unwrap();
        data.mappings
            .get(user_id)
            .cloned()
            .ok_or(DirectoryError::NotFound("user"))
    }

    async fn realm_role(&self, name: &str) -> DirectoryResult<RealmRole> {
        let data = self.data.lock().unwrap();
        data.realm_roles
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or(DirectoryError::NotFound("role"))
    }

    async fn assign_realm_roles(&self, user_id: &str, roles: &[RealmRole]) -> DirectoryResult<()> {
        let mut data = self.data.lock().unwrap();
        let mapped = data.mappings.entry(user_id.to_string()).or_default();
        for role in roles {
            if !mapped.iter().any(|r| r.id == role.id) {
                mapped.push(role.clone());
            }
        }
        Ok(())
    }

    async fn remove_realm_roles(&self, user_id: &str, roles: &[RealmRole]) -> DirectoryResult<()> {
        let mut data = self.data.lock().unwrap();
        if let Some(mapped) = data.mappings.get_mut(user_id) {
            mapped.retain(|r| !roles.iter().any(|gone| gone.id == r.id));
        }
        Ok(())
    }
}

// ---- application ----------------------------------------------------------

pub struct Upstreams {
    pub soil: Router,
    pub objects: Router,
    pub submissions: Router,
}

impl Default for Upstreams {
    fn default() -> Self {
        Self {
            soil: echo_upstream(),
            objects: echo_upstream(),
            submissions: echo_upstream(),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub directory: Arc<FakeDirectory>,
    pub config: Config,
}

pub fn config(soil: SocketAddr, objects: SocketAddr, submissions: SocketAddr) -> Config {
    let base = |addr: SocketAddr| Url::parse(&format!("http://{}", addr)).unwrap();
    Config {
        addr: "127.0.0.1:0".parse().unwrap(),
        app_env: AppEnv::Development,
        api_prefix: "/api".into(),
        cors_allowed_origins: Vec::new(),
        max_request_body_bytes: 4 * 1024 * 1024 * 1024 + 1024,
        keycloak: KeycloakConfig {
            url: "http://127.0.0.1:9".into(),
            realm: "eceo".into(),
            client_id: "eceo-spa".into(),
            bff_client_id: "eceo-bff".into(),
            bff_client_secret: "bff-secret".into(),
            public_key_pem: Some(REALM_PUBLIC.to_string()),
            public_key_ttl: Duration::from_secs(300),
            verify_audience: false,
            audience: None,
            leeway_seconds: 0,
            valid_roles: vec!["admin".into(), "user".into()],
        },
        upstream: UpstreamConfig {
            soil_api_url: base(soil),
            deepreefmap_api_url: base(objects),
            eceo_api_url: base(submissions),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(30),
            max_connections: 16,
            pool_max_idle_per_host: 4,
        },
        download_token_secret: DOWNLOAD_SECRET.into(),
        download_token_ttl: Duration::from_secs(6 * 3600),
    }
}

pub fn state_for(config: &Config, directory: Arc<FakeDirectory>) -> AppState {
    let upstream = UpstreamClient::new(&config.upstream).unwrap();
    let auth = build_auth_service(config, upstream.http().clone()).unwrap();
    let downloads =
        DownloadTokens::new(&config.download_token_secret, config.download_token_ttl).unwrap();

    AppState::new(
        auth,
        downloads,
        upstream,
        UpstreamUrls::from_config(&config.upstream),
        directory,
        IdpSettings::from_config(&config.keycloak),
    )
}

pub async fn app_with(upstreams: Upstreams, directory: FakeDirectory) -> TestApp {
    let soil = spawn(upstreams.soil).await;
    let objects = spawn(upstreams.objects).await;
    let submissions = spawn(upstreams.submissions).await;

    let config = config(soil, objects, submissions);
    let directory = Arc::new(directory);
    let state = state_for(&config, directory.clone());
    let router = build_router(state.clone(), &config);

    TestApp {
        router,
        state,
        directory,
        config,
    }
}

pub async fn app() -> TestApp {
    app_with(Upstreams::default(), FakeDirectory::with_roles(&["admin", "user"])).await
}
