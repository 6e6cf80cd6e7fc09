/*
 * Responsibility
 * - BFF 全体の URL 構造を定義
 *   - /healthz (prefix の外)
 *   - {prefix}/config/keycloak, {prefix}/users, download token 発行 / download
 *   - route table 由来の proxy routes
 * - Bearer が必要な範囲は route_layer で、local な JSON endpoint には timeout を掛ける
 */
use std::time::Duration;

use axum::{Router, routing::get};

use crate::api::handlers::{
    config::keycloak_config,
    downloads::{download, issue_download_token},
    health::health,
    users::{get_user, list_users, update_user},
};
use crate::api::route_table::RouteTable;
use crate::middleware::{auth::access, http};
use crate::state::AppState;

pub fn router(state: AppState, api_prefix: &str, table: &RouteTable, local_timeout: Duration) -> Router {
    let public = Router::new().route(&format!("{}/config/keycloak", api_prefix), get(keycloak_config));

    let protected = Router::new()
        .route(&format!("{}/users", api_prefix), get(list_users))
        .route(
            &format!("{}/users/{{id}}", api_prefix),
            get(get_user).put(update_user),
        )
        .route(
            &format!("{}/objects/{{id}}/{{filename}}", api_prefix),
            get(issue_download_token),
        );
    let protected = access::apply(protected, state.clone());

    let local = http::local(public.merge(protected), local_timeout);

    // Streams: no local timeout, the upstream client bounds them.
    let streamed = Router::new()
        .route(
            &format!("{}/objects/download/{{token}}", api_prefix),
            get(download),
        )
        .merge(table.router(&state));

    Router::new()
        .route("/healthz", get(health))
        .merge(local)
        .merge(streamed)
        .with_state(state)
}
