/*
 * Responsibility
 * - /users の request/response DTO (SPA の admin 画面向け, camelCase)
 * - Keycloak の representation からの変換
 */
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::api::extractors::{Sort, SortOrder};
use crate::services::keycloak::{DirectoryUser, RealmRole};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub admin: bool,
    pub login_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<RoleName>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RoleName {
    pub name: String,
}

impl UserResponse {
    pub fn from_directory(user: DirectoryUser, admin: bool) -> Self {
        let login_method = user.login_method();
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            admin,
            login_method,
            roles: None,
        }
    }

    pub fn with_roles(mut self, roles: &[RealmRole]) -> Self {
        self.roles = Some(
            roles
                .iter()
                .map(|r| RoleName {
                    name: r.name.clone(),
                })
                .collect(),
        );
        self
    }
}

/// Roles an admin may hand out from the UI.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub role: UserRole,
}

fn compare(a: &UserResponse, b: &UserResponse, field: &str) -> Ordering {
    fn text(v: &Option<String>) -> String {
        v.as_deref().unwrap_or_default().to_lowercase()
    }
    match field {
        "id" => a.id.cmp(&b.id),
        "email" => text(&a.email).cmp(&text(&b.email)),
        "firstName" => text(&a.first_name).cmp(&text(&b.first_name)),
        "lastName" => text(&a.last_name).cmp(&text(&b.last_name)),
        "admin" => a.admin.cmp(&b.admin),
        "loginMethod" => a.login_method.cmp(&b.login_method),
        _ => a.username.to_lowercase().cmp(&b.username.to_lowercase()),
    }
}

/// Stable sort on one of the response fields; unknown fields sort by username.
pub fn sort_users(users: &mut [UserResponse], sort: &Sort) {
    users.sort_by(|a, b| {
        let ord = compare(a, b, &sort.field);
        match sort.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}
