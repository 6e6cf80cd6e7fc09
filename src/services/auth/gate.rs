//! Capability check in front of privileged operations.

use thiserror::Error;

use crate::api::extractors::IdentityContext;
use crate::error::AppError;

/// Realm role that unlocks mutations and user management.
pub const ADMIN: &str = "admin";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("missing required role '{capability}'")]
pub struct Forbidden {
    pub capability: String,
}

/// Succeeds iff `capability` is one of the caller's realm roles.
pub fn require(ctx: &IdentityContext, capability: &str) -> Result<(), Forbidden> {
    if ctx.has_role(capability) {
        Ok(())
    } else {
        tracing::debug!(
            subject = ctx.subject_id(),
            capability,
            "capability check failed"
        );
        Err(Forbidden {
            capability: capability.to_string(),
        })
    }
}

impl From<Forbidden> for AppError {
    fn from(_: Forbidden) -> Self {
        AppError::Forbidden("You are not authorised to perform this operation".into())
    }
}
