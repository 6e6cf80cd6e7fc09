//! Keycloak claims → IdentityContext.
//!
//! A token that verifies but lacks the expected claim shape is a client error (400),
//! not an authentication failure.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::api::extractors::IdentityContext;
use crate::error::AppError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("missing '{0}' claim")]
    Missing(&'static str),
    #[error("malformed '{0}' claim")]
    Malformed(&'static str),
}

impl From<ClaimsError> for AppError {
    fn from(e: ClaimsError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

fn required_str(claims: &Map<String, Value>, name: &'static str) -> Result<String, ClaimsError> {
    match claims.get(name) {
        None | Some(Value::Null) => Err(ClaimsError::Missing(name)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(_) => Err(ClaimsError::Malformed(name)),
    }
}

fn optional_str(claims: &Map<String, Value>, name: &'static str) -> Result<Option<String>, ClaimsError> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ClaimsError::Malformed(name)),
    }
}

// `realm_access` is omitted by Keycloak when the user holds no realm roles.
fn realm_roles(claims: &Map<String, Value>) -> Result<Vec<String>, ClaimsError> {
    const NAME: &str = "realm_access.roles";

    let access = match claims.get("realm_access") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(access)) => access,
        Some(_) => return Err(ClaimsError::Malformed(NAME)),
    };

    match access.get("roles") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(roles)) => roles
            .iter()
            .map(|r| {
                r.as_str()
                    .map(str::to_string)
                    .ok_or(ClaimsError::Malformed(NAME))
            })
            .collect(),
        Some(_) => Err(ClaimsError::Malformed(NAME)),
    }
}

/// Map verified claims onto the request identity.
pub fn extract(claims: &Map<String, Value>) -> Result<IdentityContext, ClaimsError> {
    let subject_id = required_str(claims, "sub")?;
    let username = required_str(claims, "preferred_username")?;
    let email = required_str(claims, "email")?;
    let first_name = optional_str(claims, "given_name")?;
    let last_name = optional_str(claims, "family_name")?;
    let roles = realm_roles(claims)?;

    Ok(IdentityContext::new(subject_id, username, email, roles).with_names(first_name, last_name))
}
