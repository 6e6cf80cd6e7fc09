//! `Content-Range` relay for list endpoints.
//!
//! Upstreams answer list calls with `Content-Range: {resource} {start}-{end}/{total}`.
//! The header is copied as-is and exposed to browser scripts. On a paginated route a
//! successful response without it is an upstream contract breach and is surfaced,
//! never papered over with a made-up range.

use std::fmt;

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};

use crate::services::proxy::ProxyError;

/// Local ranges only; relayed headers are never parsed or rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRange {
    pub resource: String,
    // None when the page is empty
    pub span: Option<(u64, u64)>,
    pub total: u64,
}

impl ContentRange {
    /// Range for a page of `returned` items starting at `start`, out of `total`.
    pub fn local(resource: impl Into<String>, start: u64, returned: u64, total: u64) -> Self {
        let span = (returned > 0).then(|| (start, start + returned - 1));
        Self {
            resource: resource.into(),
            span,
            total,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (resource, rest) = raw.trim().split_once(' ')?;
        let (span, total) = rest.split_once('/')?;
        let total = total.parse().ok()?;
        let span = if span == "*" {
            None
        } else {
            let (start, end) = span.split_once('-')?;
            let (start, end): (u64, u64) = (start.parse().ok()?, end.parse().ok()?);
            if end < start {
                return None;
            }
            Some((start, end))
        };
        Some(Self {
            resource: resource.to_string(),
            span,
            total,
        })
    }

    pub fn to_header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.to_string()).ok()
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some((start, end)) => write!(f, "{} {}-{}/{}", self.resource, start, end, self.total),
            None => write!(f, "{} */{}", self.resource, self.total),
        }
    }
}

pub fn expose_content_range(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Range"),
    );
}

/// Copy `Content-Range` from `upstream` to `out` for a paginated route.
pub fn relay(
    status: StatusCode,
    upstream: &HeaderMap,
    out: &mut HeaderMap,
) -> Result<(), ProxyError> {
    match upstream.get(header::CONTENT_RANGE) {
        Some(value) => {
            out.insert(header::CONTENT_RANGE, value.clone());
            expose_content_range(out);
            Ok(())
        }
        None if status.is_success() => {
            tracing::warn!(%status, "paginated upstream response without Content-Range");
            Err(ProxyError::MissingContentRange)
        }
        // error bodies are relayed untouched
        None => Ok(()),
    }
}
