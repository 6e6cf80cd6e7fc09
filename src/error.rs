/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body `{code, detail}`)
 * - 各サービス層のエラー (token / download token / proxy / keycloak) をここで HTTP に変換する
 */
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    // Same status as Unauthorized; kept apart so callers and logs can tell the causes apart.
    #[error("{0}")]
    Expired(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("upstream request timed out")]
    UpstreamTimeout,

    // An upstream answered with an error status on a call the BFF made on its own behalf.
    #[error("{detail}")]
    UpstreamRejected { status: StatusCode, detail: String },

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn not_found(resource: &'static str) -> Self {
        Self::NotFound { resource }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::Expired(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::UpstreamRejected { status, .. } => *status,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Expired(_) => "EXPIRED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            AppError::UpstreamUnavailable(_) | AppError::UpstreamRejected { .. } => {
                "UPSTREAM_ERROR"
            }
            AppError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            AppError::Internal => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let challenge = status == StatusCode::UNAUTHORIZED;

        let body = ErrorBody {
            code: self.code(),
            detail: self.to_string(),
        };

        let mut res = (status, Json(body)).into_response();
        if challenge {
            res.headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        res
    }
}

// axum answers these in text/plain; keep the `{code, detail}` body instead.
impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<ConfigError> for AppError {
    fn from(_: ConfigError) -> Self {
        AppError::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_carries_bearer_challenge() {
        let res = AppError::Unauthorized("missing bearer token".into()).into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }

    #[test]
    fn expired_is_401_with_its_own_code() {
        let err = AppError::Expired("download token expired".into());
        assert_eq!(err.code(), "EXPIRED");
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[test]
    fn forbidden_has_no_challenge() {
        let res = AppError::Forbidden("nope".into()).into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(!res.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[test]
    fn internal_hides_detail() {
        assert_eq!(AppError::Internal.to_string(), "internal server error");
    }

    #[test]
    fn upstream_rejection_keeps_upstream_status() {
        let err = AppError::UpstreamRejected {
            status: StatusCode::NOT_FOUND,
            detail: "object not found".into(),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "object not found");
    }
}
