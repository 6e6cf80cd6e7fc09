//! `filter` / `sort` / `range` query parameters of list endpoints.
//!
//! The SPA sends each parameter as a JSON-encoded string:
//! `?filter={"username":"jo"}&sort=["username","ASC"]&range=[0,9]`.
//! Proxied collections pass them through verbatim; endpoints that page locally
//! decode them with this extractor.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::AppError;

/// Raw query parameters, as received.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub range: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

/// Largest page a client may ask for in one `range`.
pub const MAX_PAGE_SIZE: u64 = 1000;

// Keycloak takes `first` as a 32-bit integer.
const MAX_OFFSET: u64 = i32::MAX as u64;

/// Inclusive index range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Range {
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }
}

/// Decoded list parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub filter: Map<String, Value>,
    pub sort: Option<Sort>,
    pub range: Option<Range>,
}

impl ListParams {
    pub fn filter_str(&self, key: &str) -> Option<&str> {
        self.filter.get(key).and_then(Value::as_str)
    }

    pub fn filter_bool(&self, key: &str) -> Option<bool> {
        self.filter.get(key).and_then(Value::as_bool)
    }
}

fn bad(param: &str, reason: &str) -> AppError {
    AppError::BadRequest(format!("invalid '{}' parameter: {}", param, reason))
}

fn parse_json(param: &str, raw: &str) -> Result<Value, AppError> {
    serde_json::from_str(raw).map_err(|e| bad(param, &e.to_string()))
}

impl ListQuery {
    pub fn decode(&self) -> Result<ListParams, AppError> {
        let filter = match self.filter.as_deref().map(str::trim) {
            None | Some("") => Map::new(),
            Some(raw) => match parse_json("filter", raw)? {
                Value::Object(map) => map,
                _ => return Err(bad("filter", "expected a JSON object")),
            },
        };

        let sort = match self.sort.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(decode_sort(parse_json("sort", raw)?)?),
        };

        let range = match self.range.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(decode_range(parse_json("range", raw)?)?),
        };

        Ok(ListParams {
            filter,
            sort,
            range,
        })
    }
}

fn decode_sort(value: Value) -> Result<Sort, AppError> {
    let [field, order]: [Value; 2] = match value {
        Value::Array(items) => items
            .try_into()
            .map_err(|_| bad("sort", "expected [field, order]"))?,
        _ => return Err(bad("sort", "expected [field, order]")),
    };

    let field = field
        .as_str()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| bad("sort", "field must be a non-empty string"))?
        .to_string();

    let order = match order.as_str().map(str::to_ascii_uppercase).as_deref() {
        Some("ASC") => SortOrder::Asc,
        Some("DESC") => SortOrder::Desc,
        _ => return Err(bad("sort", "order must be ASC or DESC")),
    };

    Ok(Sort { field, order })
}

fn decode_range(value: Value) -> Result<Range, AppError> {
    let [start, end]: [Value; 2] = match value {
        Value::Array(items) => items
            .try_into()
            .map_err(|_| bad("range", "expected [start, end]"))?,
        _ => return Err(bad("range", "expected [start, end]")),
    };

    let start = start
        .as_u64()
        .ok_or_else(|| bad("range", "start must be a non-negative integer"))?;
    let end = end
        .as_u64()
        .ok_or_else(|| bad("range", "end must be a non-negative integer"))?;

    if end < start {
        return Err(bad("range", "end is before start"));
    }
    if start > MAX_OFFSET {
        return Err(bad("range", "start is out of bounds"));
    }
    if end - start >= MAX_PAGE_SIZE {
        return Err(bad(
            "range",
            &format!("at most {} items per page", MAX_PAGE_SIZE),
        ));
    }

    Ok(Range { start, end })
}

impl<S> FromRequestParts<S> for ListParams
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(raw) = Query::<ListQuery>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        raw.decode()
    }
}
