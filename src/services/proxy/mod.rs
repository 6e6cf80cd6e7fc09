//! Streaming reverse proxy to the upstream APIs.

pub mod client;
pub mod error;
pub mod forward;
pub mod headers;
pub mod pagination;
pub mod target;

pub use client::{UpstreamClient, UpstreamResponse};
pub use error::ProxyError;
pub use forward::{Forwarding, forward};
pub use headers::IdentityHeaders;
pub use pagination::ContentRange;
pub use target::{ProxyTarget, Upstream, UpstreamUrls, url_with_segments};
