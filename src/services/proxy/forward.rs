//! One inbound request → one upstream request, both bodies streamed.

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures::{StreamExt, TryStreamExt};
use url::Url;

use crate::api::extractors::IdentityContext;
use crate::services::proxy::{
    IdentityHeaders, ProxyError, UpstreamClient, UpstreamResponse, headers, pagination,
};

/// Per-route forwarding options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forwarding {
    pub identity_headers: IdentityHeaders,
    pub paginated: bool,
}

/// Forward `req` to `url` and stream the upstream answer back.
///
/// Upstream statuses (4xx/5xx included) are relayed, not converted. Only failures
/// to obtain a response at all become a [`ProxyError`].
pub async fn forward(
    client: &UpstreamClient,
    url: Url,
    req: Request<Body>,
    identity: Option<&IdentityContext>,
    opts: Forwarding,
) -> Result<Response, ProxyError> {
    let (parts, body) = req.into_parts();
    let outbound = headers::request_headers(&parts.headers, identity, opts.identity_headers)?;

    tracing::debug!(method = %parts.method, %url, "forwarding upstream");

    let UpstreamResponse { response, permit } = client
        .execute(parts.method, url.clone(), outbound, body)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, %url, "upstream exchange failed"))?;

    let status = response.status();
    let mut relayed = headers::response_headers(response.headers());
    if opts.paginated {
        pagination::relay(status, response.headers(), &mut relayed)?;
    }

    // The permit lives as long as the body stream.
    let stream = response
        .bytes_stream()
        .inspect_err(move |e| {
            tracing::warn!(error = %e, %url, "upstream body aborted mid-stream");
        })
        .map(move |chunk| {
            let _ = &permit;
            chunk
        });

    let mut res = Response::new(Body::from_stream(stream));
    *res.status_mut() = status;
    *res.headers_mut() = relayed;
    Ok(res)
}
