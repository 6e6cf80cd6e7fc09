/*
 * Responsibility
 * - GET {prefix}/config/keycloak (認証不要)
 * - SPA が自分で login flow を始めるための公開情報だけを返す (secret は含めない)
 */
use axum::{Json, extract::State};

use crate::{api::dto::keycloak_config::KeycloakConfigResponse, state::AppState};

pub async fn keycloak_config(State(state): State<AppState>) -> Json<KeycloakConfigResponse> {
    Json(KeycloakConfigResponse::from(state.idp.as_ref()))
}
