//! CORS policy for the SPA.
//!
//! Note:
//! - CORS is enforced by browsers. Server-to-server calls are not restricted by it.
//! - Applied once at the top-level Router, outside auth, so preflights never need a token.
//!
//! Policy:
//! - Development: permissive (Allow-Origin: *), WITHOUT credentials.
//! - Production: allowlist origins from Config (comma-separated env var), WITHOUT credentials.
//! - `Content-Range` is exposed so list views can read totals.
//! - Chunked upload headers are allowed in both directions.

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;

const UPLOAD_HEADERS: [&str; 5] = [
    "upload-length",
    "upload-offset",
    "upload-metadata",
    "upload-concat",
    "tus-resumable",
];

fn upload_headers() -> impl Iterator<Item = HeaderName> {
    UPLOAD_HEADERS.into_iter().map(HeaderName::from_static)
}

/// Apply CORS policy to the given Router.
///
/// IMPORTANT:
/// - Do not combine wildcard origin (`Any`) with `allow_credentials(true)`.
pub fn apply(router: Router, config: &Config) -> Router {
    router.layer(layer(config))
}

pub fn layer(config: &Config) -> CorsLayer {
    let cors = if config.app_env.is_production() {
        // Empty allowlist means no CORS headers at all rather than allowing everyone.
        let allowed: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();

        let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _req| {
            allowed.iter().any(|v| v == origin)
        });

        CorsLayer::new().allow_origin(allow_origin)
    } else {
        CorsLayer::new().allow_origin(Any)
    };

    let mut allow_headers = vec![
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::RANGE,
        HeaderName::from_static("x-request-id"),
    ];
    allow_headers.extend(upload_headers());

    let mut expose_headers = vec![
        header::CONTENT_RANGE,
        header::CONTENT_DISPOSITION,
        header::LOCATION,
        HeaderName::from_static("x-request-id"),
    ];
    expose_headers.extend(upload_headers());

    cors.allow_methods([
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ])
    .allow_headers(allow_headers)
    .expose_headers(expose_headers)
    .max_age(std::time::Duration::from_secs(60 * 10))
}
