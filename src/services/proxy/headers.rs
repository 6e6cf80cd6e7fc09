//! Header handling for both directions of the proxy.
//!
//! Request: copy everything except hop-by-hop headers and `Host`, then overlay the
//! identity headers. Client-sent identity headers are always dropped so they cannot
//! be spoofed, whether or not the request carries an identity.
//!
//! Response: copy everything except hop-by-hop headers. `Content-Length` is kept unless
//! the upstream framed the body with `Transfer-Encoding`; the transport re-frames.

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};

use crate::api::extractors::IdentityContext;
use crate::services::auth::gate::ADMIN;
use crate::services::proxy::ProxyError;

pub const USER_ID: HeaderName = HeaderName::from_static("user-id");
pub const USER_ROLES: HeaderName = HeaderName::from_static("user-roles");
pub const USER_IS_ADMIN: HeaderName = HeaderName::from_static("user-is-admin");

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Which identity headers a route group sends upstream (besides `User-ID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityHeaders {
    None,
    /// `User-Roles: admin,user`
    Roles,
    /// `User-Is-Admin: true|false`
    AdminFlag,
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == KEEP_ALIVE
        || name == header::PROXY_AUTHENTICATE
        || name == header::PROXY_AUTHORIZATION
        || name == header::TE
        || name == header::TRAILER
        || name == header::TRANSFER_ENCODING
        || name == header::UPGRADE
}

fn is_identity(name: &HeaderName) -> bool {
    name == USER_ID || name == USER_ROLES || name == USER_IS_ADMIN
}

// Extra hop-by-hop headers nominated by the `Connection` header.
fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

fn copy_end_to_end(src: &HeaderMap, skip: impl Fn(&HeaderName) -> bool) -> HeaderMap {
    let listed = connection_listed(src);
    let mut out = HeaderMap::with_capacity(src.len());
    for (name, value) in src {
        if is_hop_by_hop(name) || listed.contains(name) || skip(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn header_value(value: &str, name: &'static str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(value).map_err(|_| ProxyError::InvalidIdentityHeader(name))
}

/// Headers for the outbound request.
pub fn request_headers(
    inbound: &HeaderMap,
    identity: Option<&IdentityContext>,
    mode: IdentityHeaders,
) -> Result<HeaderMap, ProxyError> {
    let mut out = copy_end_to_end(inbound, |name| name == header::HOST || is_identity(name));

    let Some(ctx) = identity else {
        return Ok(out);
    };

    match mode {
        IdentityHeaders::None => {}
        IdentityHeaders::Roles => {
            out.insert(USER_ID, header_value(ctx.subject_id(), "User-ID")?);
            out.insert(USER_ROLES, header_value(&ctx.roles_header(), "User-Roles")?);
        }
        IdentityHeaders::AdminFlag => {
            out.insert(USER_ID, header_value(ctx.subject_id(), "User-ID")?);
            let flag = if ctx.has_role(ADMIN) { "true" } else { "false" };
            out.insert(USER_IS_ADMIN, HeaderValue::from_static(flag));
        }
    }

    Ok(out)
}

/// Headers relayed back to the caller.
pub fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let chunked = upstream.contains_key(header::TRANSFER_ENCODING);
    copy_end_to_end(upstream, |name| chunked && name == header::CONTENT_LENGTH)
}
