/*
 * Responsibility
 * - /users 系 handler (admin 専用, Keycloak Admin API 経由)
 * - 一覧は BFF 側でページングするので Content-Range もここで計算する
 * - role 変更は「desired − current を追加 / current − desired を削除」
 */
use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, header},
};

use crate::{
    api::{
        dto::users::{UpdateUserRequest, UserResponse, sort_users},
        extractors::{AdminIdentity, ListParams, Range},
    },
    error::AppError,
    services::{
        auth::gate::ADMIN,
        keycloak::{RealmRole, set_managed_roles},
        proxy::{ContentRange, pagination::expose_content_range},
    },
    state::AppState,
};

// Used when the client sends no `range`.
const DEFAULT_PAGE: Range = Range { start: 0, end: 24 };

pub async fn list_users(
    State(state): State<AppState>,
    AdminIdentity(_): AdminIdentity,
    params: ListParams,
) -> Result<(HeaderMap, Json<Vec<UserResponse>>), AppError> {
    let range = params.range.unwrap_or(DEFAULT_PAGE);
    let username = params.filter_str("username").filter(|u| !u.is_empty());

    let admins = state.directory.role_members(ADMIN).await?;

    let (page, total) = if params.filter_bool("admin") == Some(true) {
        // Admins are few: list them all and page here.
        let needle = username.map(str::to_lowercase);
        let mut all: Vec<UserResponse> = admins
            .into_iter()
            .filter(|u| {
                needle
                    .as_deref()
                    .is_none_or(|q| u.username.to_lowercase().contains(q))
            })
            .map(|u| UserResponse::from_directory(u, true))
            .collect();
        if let Some(sort) = &params.sort {
            sort_users(&mut all, sort);
        }

        let total = all.len() as u64;
        let page = all
            .into_iter()
            .skip(range.start as usize)
            .take(range.len() as usize)
            .collect();
        (page, total)
    } else {
        let admin_ids: HashSet<String> = admins.into_iter().map(|u| u.id).collect();
        let users = state
            .directory
            .list_users(range.start, range.len(), username)
            .await?;
        let total = state.directory.count_users(username).await?;

        let mut page: Vec<UserResponse> = users
            .into_iter()
            .map(|u| {
                let admin = admin_ids.contains(&u.id);
                UserResponse::from_directory(u, admin)
            })
            .collect();
        // The directory pages by its own order; only the page itself can be re-sorted.
        if let Some(sort) = &params.sort {
            sort_users(&mut page, sort);
        }
        (page, total)
    };

    let mut headers = HeaderMap::new();
    if let Some(value) =
        ContentRange::local("users", range.start, page.len() as u64, total).to_header_value()
    {
        headers.insert(header::CONTENT_RANGE, value);
    }
    expose_content_range(&mut headers);

    Ok((headers, Json(page)))
}

pub async fn get_user(
    State(state): State<AppState>,
    AdminIdentity(_): AdminIdentity,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(load_user(&state, &user_id).await?))
}

pub async fn update_user(
    State(state): State<AppState>,
    AdminIdentity(caller): AdminIdentity,
    Path(user_id): Path<String>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let Json(req) = body?;
    let role = req.role.as_str();
    if !state.idp.valid_roles.iter().any(|r| r == role) {
        return Err(AppError::BadRequest(format!("role '{}' is not assignable", role)));
    }

    // 404 before touching role mappings
    state.directory.get_user(&user_id).await?;

    set_managed_roles(
        state.directory.as_ref(),
        &user_id,
        &[role],
        &state.idp.valid_roles,
    )
    .await?;

    tracing::info!(
        by = caller.subject_id(),
        user_id = %user_id,
        role,
        "user role changed"
    );

    Ok(Json(load_user(&state, &user_id).await?))
}

async fn load_user(state: &AppState, user_id: &str) -> Result<UserResponse, AppError> {
    let user = state.directory.get_user(user_id).await?;
    let roles = state.directory.user_realm_roles(user_id).await?;

    let admin = roles.iter().any(|r| r.name == ADMIN);
    let visible: Vec<RealmRole> = roles
        .into_iter()
        .filter(|r| state.idp.valid_roles.contains(&r.name))
        .collect();

    Ok(UserResponse::from_directory(user, admin).with_roles(&visible))
}
