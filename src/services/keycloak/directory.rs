//! User directory interface used by the user-management handlers.
use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Directory errors (transport/status/payload).
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),
    #[error("identity provider rejected the service credentials")]
    Credentials,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("identity provider returned {status}: {detail}")]
    Status {
        status: reqwest::StatusCode,
        detail: String,
    },
    #[error("unexpected identity provider payload: {0}")]
    Payload(String),
}

impl From<DirectoryError> for AppError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::NotFound(resource) => AppError::not_found(resource),
            DirectoryError::Credentials => {
                tracing::error!(error = %e, "keycloak admin login failed");
                AppError::UpstreamUnavailable(e.to_string())
            }
            _ => {
                tracing::warn!(error = %e, "keycloak admin call failed");
                AppError::UpstreamUnavailable(e.to_string())
            }
        }
    }
}

/// A user as stored by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryUser {
    /// `attributes.login-method[0]`, upper-cased; users without it came through EPFL.
    pub fn login_method(&self) -> String {
        self.attributes
            .get("login-method")
            .and_then(|values| values.first())
            .map(|m| m.to_uppercase())
            .unwrap_or_else(|| "EPFL".to_string())
    }
}

/// Realm role; identity is the `id`, `name` is what users see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmRole {
    pub id: String,
    pub name: String,
}

/// Read and role-mapping operations on the realm's users.
///
/// Implementations are shared behind `Arc<dyn UserDirectory>`.
#[async_trait]
pub trait UserDirectory: std::fmt::Debug + Send + Sync + 'static {
    async fn get_user(&self, user_id: &str) -> DirectoryResult<DirectoryUser>;

    // One page of users, optionally narrowed by a username search.
    async fn list_users(
        &self,
        first: u64,
        max: u64,
        username: Option<&str>,
    ) -> DirectoryResult<Vec<DirectoryUser>>;

    async fn count_users(&self, username: Option<&str>) -> DirectoryResult<u64>;

    // Every user holding `role` directly.
    async fn role_members(&self, role: &str) -> DirectoryResult<Vec<DirectoryUser>>;

    async fn user_realm_roles(&self, user_id: &str) -> DirectoryResult<Vec<RealmRole>>;

    async fn realm_role(&self, name: &str) -> DirectoryResult<RealmRole>;

    async fn assign_realm_roles(&self, user_id: &str, roles: &[RealmRole]) -> DirectoryResult<()>;

    async fn remove_realm_roles(&self, user_id: &str, roles: &[RealmRole]) -> DirectoryResult<()>;
}
