//! Role assignment as a set difference over role ids.
use std::collections::HashSet;

use crate::services::keycloak::directory::{DirectoryResult, RealmRole, UserDirectory};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RoleDiff {
    pub add: Vec<RealmRole>,
    pub remove: Vec<RealmRole>,
}

/// `desired − current` is added, `current − desired` is removed.
pub fn diff_roles(desired: &[RealmRole], current: &[RealmRole]) -> RoleDiff {
    let desired_ids: HashSet<&str> = desired.iter().map(|r| r.id.as_str()).collect();
    let current_ids: HashSet<&str> = current.iter().map(|r| r.id.as_str()).collect();

    RoleDiff {
        add: desired
            .iter()
            .filter(|r| !current_ids.contains(r.id.as_str()))
            .cloned()
            .collect(),
        remove: current
            .iter()
            .filter(|r| !desired_ids.contains(r.id.as_str()))
            .cloned()
            .collect(),
    }
}

/// Make `desired` the user's only role among `managed`; other realm roles are untouched.
pub async fn set_managed_roles(
    directory: &dyn UserDirectory,
    user_id: &str,
    desired: &[&str],
    managed: &[String],
) -> DirectoryResult<RoleDiff> {
    let mut wanted = Vec::with_capacity(desired.len());
    for name in desired {
        wanted.push(directory.realm_role(name).await?);
    }

    let current: Vec<RealmRole> = directory
        .user_realm_roles(user_id)
        .await?
        .into_iter()
        .filter(|r| managed.iter().any(|m| m == &r.name))
        .collect();

    let diff = diff_roles(&wanted, &current);
    directory.assign_realm_roles(user_id, &diff.add).await?;
    directory.remove_realm_roles(user_id, &diff.remove).await?;

    tracing::info!(
        user_id,
        added = ?diff.add.iter().map(|r| &r.name).collect::<Vec<_>>(),
        removed = ?diff.remove.iter().map(|r| &r.name).collect::<Vec<_>>(),
        "realm roles updated"
    );
    Ok(diff)
}
