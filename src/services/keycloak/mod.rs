pub mod admin;
pub mod directory;
pub mod roles;

pub use admin::KeycloakAdmin;
pub use directory::{DirectoryError, DirectoryUser, RealmRole, UserDirectory};
pub use roles::{RoleDiff, diff_roles, set_managed_roles};
