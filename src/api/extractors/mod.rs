pub mod auth_ctx;
pub mod list_query;

pub use auth_ctx::{AdminIdentity, Identity, IdentityContext};
pub use list_query::{ListParams, ListQuery, Range, Sort, SortOrder};
