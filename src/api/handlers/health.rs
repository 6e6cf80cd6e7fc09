/*
 * Responsibility
 * - GET /healthz (疎通用)
 * - upstream / Keycloak には依存しない
 */
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "OK"})))
}
