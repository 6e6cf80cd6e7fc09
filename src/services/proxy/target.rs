//! Where a proxied request goes.
//!
//! A [`ProxyTarget`] swaps the BFF's public collection prefix for the upstream's
//! versioned prefix and keeps the rest of the path and the raw query untouched:
//! `/api/sensordata/42?range=[0,9]` → `{soil}/v1/sensors/data/42?range=[0,9]`.

use axum::http::Uri;
use url::Url;

use crate::config::UpstreamConfig;
use crate::services::proxy::ProxyError;

/// The independent upstream APIs behind the BFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Upstream {
    Soil,
    Objects,
    Submissions,
}

/// Configured base URL per upstream; read-only for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct UpstreamUrls {
    pub soil: Url,
    pub objects: Url,
    pub submissions: Url,
}

impl UpstreamUrls {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            soil: config.soil_api_url.clone(),
            objects: config.deepreefmap_api_url.clone(),
            submissions: config.eceo_api_url.clone(),
        }
    }

    pub fn base(&self, upstream: Upstream) -> &Url {
        match upstream {
            Upstream::Soil => &self.soil,
            Upstream::Objects => &self.objects,
            Upstream::Submissions => &self.submissions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub upstream: Upstream,
    pub public_prefix: String,
    pub upstream_prefix: String,
}

impl ProxyTarget {
    pub fn new(
        upstream: Upstream,
        public_prefix: impl Into<String>,
        upstream_prefix: impl Into<String>,
    ) -> Self {
        Self {
            upstream,
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
            upstream_prefix: upstream_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Rewritten path-and-query. The prefix must match on a segment boundary.
    pub fn rewrite(&self, uri: &Uri) -> Result<String, ProxyError> {
        let path = uri.path();
        let rest = path
            .strip_prefix(self.public_prefix.as_str())
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .ok_or_else(|| ProxyError::PathMismatch {
                path: path.to_string(),
                prefix: self.public_prefix.clone(),
            })?;

        let mut out = String::with_capacity(self.upstream_prefix.len() + rest.len() + 1);
        out.push_str(&self.upstream_prefix);
        out.push_str(rest);
        if out.is_empty() {
            out.push('/');
        }
        if let Some(query) = uri.query() {
            out.push('?');
            out.push_str(query);
        }
        Ok(out)
    }

    pub fn upstream_url(&self, base: &Url, uri: &Uri) -> Result<Url, ProxyError> {
        let path_and_query = self.rewrite(uri)?;
        let raw = format!("{}{}", base.as_str().trim_end_matches('/'), path_and_query);
        Url::parse(&raw).map_err(|e| ProxyError::InvalidUrl(format!("{}: {}", raw, e)))
    }
}

/// `{base}/{segments...}` with each segment percent-encoded.
pub fn url_with_segments(base: &Url, segments: &[&str]) -> Result<Url, ProxyError> {
    let mut url = base.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| ProxyError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
