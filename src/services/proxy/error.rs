use std::error::Error as StdError;

use http_body_util::LengthLimitError;
use thiserror::Error;

use crate::error::AppError;

/// Failures of the proxy itself. A well-formed upstream response, whatever its
/// status, is never a `ProxyError`; it is relayed as-is.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("path '{path}' is not under '{prefix}'")]
    PathMismatch { path: String, prefix: String },

    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),

    #[error("request body exceeds the configured limit")]
    BodyTooLarge,

    #[error("upstream list response is missing Content-Range")]
    MissingContentRange,

    #[error("failed to build upstream client: {0}")]
    Client(String),

    #[error("{0} cannot be expressed as a header value")]
    InvalidIdentityHeader(&'static str),
}

impl ProxyError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        // The inbound body limit surfaces as a body error somewhere in the source chain.
        let mut source = e.source();
        while let Some(err) = source {
            if err.is::<LengthLimitError>() {
                return Self::BodyTooLarge;
            }
            source = err.source();
        }

        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Unreachable(e.to_string())
        }
    }
}

impl From<ProxyError> for AppError {
    fn from(e: ProxyError) -> Self {
        match e {
            ProxyError::Timeout => AppError::UpstreamTimeout,
            ProxyError::Unreachable(_) | ProxyError::MissingContentRange => {
                AppError::UpstreamUnavailable(e.to_string())
            }
            ProxyError::BodyTooLarge => AppError::PayloadTooLarge,
            ProxyError::InvalidIdentityHeader(_) => AppError::BadRequest(e.to_string()),
            ProxyError::PathMismatch { .. } | ProxyError::InvalidUrl(_) | ProxyError::Client(_) => {
                tracing::error!(error = %e, "proxy misconfiguration");
                AppError::Internal
            }
        }
    }
}
