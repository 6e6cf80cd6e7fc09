//! HTTP-level middleware (cross-cutting concerns).
//!
//! Responsibility:
//! - Request-Id generation + propagation (X-Request-Id)
//! - Access logging / request tracing (TraceLayer)
//! - Body size limit (streamed bodies are counted, not buffered)
//! - Timeout + `Cache-Control: no-store` for the BFF's own JSON endpoints
//!
//! Notes:
//! - The timeout is NOT applied globally: proxied uploads/downloads may legitimately
//!   run for a long time. Upstream exchanges are bounded by the upstream client instead.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::error_handling::HandleErrorLayer;
use axum::http::{HeaderValue, Request, header, header::HeaderName};
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::AppError;
use crate::state::AppState;

const REQUEST_ID: &str = "x-request-id";

/// Apply HTTP-level middleware to the whole application.
pub fn apply(router: Router, config: &Config) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID);
    let body_limit = usize::try_from(config.max_request_body_bytes).unwrap_or(usize::MAX);

    let layers = ServiceBuilder::new()
        // Generate a request id if missing, then propagate it to the response.
        .layer(SetRequestIdLayer::new(
            request_id_header.clone(),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header))
        // Access log; the request id is already set at this point.
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            let request_id = req
                .headers()
                .get(REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http",
                method = %req.method(),
                path = %req.uri().path(),
                request_id
            )
        }))
        // Counts streamed bytes; a declared Content-Length over the limit is a 413 up front.
        .layer(RequestBodyLimitLayer::new(body_limit));

    router.layer(layers)
}

/// Timeout and no-store for routes answered by the BFF itself.
pub fn local(router: Router<AppState>, timeout: Duration) -> Router<AppState> {
    let layers = ServiceBuilder::new()
        // Make the service error `Infallible` by converting errors into responses.
        .layer(HandleErrorLayer::new(|err: BoxError| async move {
            if err.is::<tower::timeout::error::Elapsed>() {
                AppError::UpstreamTimeout
            } else {
                tracing::error!(error = %err, "local route failed");
                AppError::Internal
            }
        }))
        .layer(TimeoutLayer::new(timeout))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    router.layer(layers)
}
