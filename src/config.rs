/*
 * Responsibility
 * - 環境変数の読み込み (Keycloak, upstream URL, download token, pool limits, CORS)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

/// Original service caps uploads at 4 GiB plus a small envelope for headers/framing.
const DEFAULT_MAX_REQUEST_BODY_BYTES: u64 = 4 * 1024 * 1024 * 1024 + 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()))
    }

    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Identity provider settings.
#[derive(Debug, Clone)]
pub struct KeycloakConfig {
    pub url: String,
    pub realm: String,
    // Public client used by the SPA (served by `GET {prefix}/config/keycloak`)
    pub client_id: String,
    // Confidential client used for the admin REST API
    pub bff_client_id: String,
    pub bff_client_secret: String,
    // Static key overrides fetching `{url}/realms/{realm}`
    pub public_key_pem: Option<String>,
    pub public_key_ttl: Duration,
    pub verify_audience: bool,
    pub audience: Option<String>,
    pub leeway_seconds: u64,
    pub valid_roles: Vec<String>,
}

/// Base URLs of the proxied APIs.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub soil_api_url: Url,
    pub deepreefmap_api_url: Url,
    pub eceo_api_url: Url,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_connections: usize,
    pub pool_max_idle_per_host: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub api_prefix: String,
    pub cors_allowed_origins: Vec<String>,
    pub max_request_body_bytes: u64,

    pub keycloak: KeycloakConfig,
    pub upstream: UpstreamConfig,

    pub download_token_secret: String,
    pub download_token_ttl: Duration,
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parsed_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid(key))
        }
        _ => Ok(default),
    }
}

fn url(key: &'static str) -> Result<Url, ConfigError> {
    let raw = required(key)?;
    let url = Url::parse(raw.trim()).map_err(|_| ConfigError::Invalid(key))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(key));
    }
    Ok(url)
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Normalise `API_PREFIX` to `/segment[/segment]` (leading slash, no trailing slash).
pub fn normalize_prefix(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid("API_PREFIX"));
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{}", trimmed))
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = parsed_or("PORT", 8000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let api_prefix =
            normalize_prefix(&std::env::var("API_PREFIX").unwrap_or_else(|_| "/api".into()))?;

        let cors_allowed_origins = list(&std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default());

        let max_request_body_bytes =
            parsed_or("MAX_REQUEST_BODY_BYTES", DEFAULT_MAX_REQUEST_BODY_BYTES)?;

        let verify_audience = parsed_or("KEYCLOAK_VERIFY_AUDIENCE", false)?;
        let audience = std::env::var("KEYCLOAK_AUDIENCE")
            .ok()
            .filter(|v| !v.trim().is_empty());
        if verify_audience && audience.is_none() {
            return Err(ConfigError::Missing("KEYCLOAK_AUDIENCE"));
        }

        let valid_roles = list(
            &std::env::var("KEYCLOAK_VALID_ROLES").unwrap_or_else(|_| "admin,user".into()),
        );

        let keycloak = KeycloakConfig {
            url: required("KEYCLOAK_URL")?.trim_end_matches('/').to_string(),
            realm: required("KEYCLOAK_REALM")?,
            client_id: required("KEYCLOAK_CLIENT_ID")?,
            bff_client_id: required("KEYCLOAK_BFF_ID")?,
            bff_client_secret: required("KEYCLOAK_BFF_SECRET")?,
            public_key_pem: std::env::var("KEYCLOAK_PUBLIC_KEY_PEM")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.replace("\\n", "\n")),
            public_key_ttl: Duration::from_secs(parsed_or("KEYCLOAK_PUBLIC_KEY_TTL_SECONDS", 300)?),
            verify_audience,
            audience,
            leeway_seconds: parsed_or("ACCESS_TOKEN_LEEWAY_SECONDS", 0)?,
            valid_roles,
        };

        let upstream = UpstreamConfig {
            soil_api_url: url("SOIL_API_URL")?,
            deepreefmap_api_url: url("DEEPREEFMAP_API_URL")?,
            eceo_api_url: url("ECEO_API_URL")?,
            timeout: Duration::from_secs(parsed_or("UPSTREAM_TIMEOUT_SECONDS", 30)?),
            connect_timeout: Duration::from_secs(parsed_or("UPSTREAM_CONNECT_TIMEOUT_SECONDS", 10)?),
            read_timeout: Duration::from_secs(parsed_or("UPSTREAM_READ_TIMEOUT_SECONDS", 300)?),
            max_connections: parsed_or("UPSTREAM_MAX_CONNECTIONS", 100)?,
            pool_max_idle_per_host: parsed_or("UPSTREAM_POOL_MAX_IDLE_PER_HOST", 20)?,
        };
        if upstream.max_connections == 0 {
            return Err(ConfigError::Invalid("UPSTREAM_MAX_CONNECTIONS"));
        }

        let download_token_secret = required("DOWNLOAD_TOKEN_SECRET")?;
        let download_token_ttl =
            Duration::from_secs(parsed_or("DOWNLOAD_TOKEN_TTL_SECONDS", 6 * 60 * 60)?);
        if download_token_ttl.is_zero() {
            return Err(ConfigError::Invalid("DOWNLOAD_TOKEN_TTL_SECONDS"));
        }

        Ok(Self {
            addr,
            app_env,
            api_prefix,
            cors_allowed_origins,
            max_request_body_bytes,
            keycloak,
            upstream,
            download_token_secret,
            download_token_ttl,
        })
    }
}
