/*
 * Responsibility
 * - Handler / proxy から見える「認証済みコンテキスト」の型
 * - middleware が token を検証して request extensions に格納し、handler はこの型だけを受け取る
 *
 * Notes
 * - token 検証・claim の読み取りは services/auth 側の責務
 * - リクエストごとに一度だけ作られ、レスポンス後に破棄される (永続化しない)
 */

use std::collections::BTreeSet;

/// Identity of the caller, derived once per request from a validated bearer token.
///
/// Fields are private so a context cannot be edited after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    subject_id: String,
    username: String,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    realm_roles: BTreeSet<String>,
}

impl IdentityContext {
    pub fn new(
        subject_id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        realm_roles: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            username: username.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            realm_roles: realm_roles.into_iter().collect(),
        }
    }

    pub fn with_names(mut self, first_name: Option<String>, last_name: Option<String>) -> Self {
        self.first_name = first_name;
        self.last_name = last_name;
        self
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }

    pub fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    pub fn realm_roles(&self) -> &BTreeSet<String> {
        &self.realm_roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.realm_roles.contains(role)
    }

    /// Roles joined with `,` in sorted order, as sent upstream in `User-Roles`.
    pub fn roles_header(&self) -> String {
        self.realm_roles
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}
