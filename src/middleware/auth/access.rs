//! access token (Keycloak JWT) 検証 → IdentityContext を extensions に入れる
//!
//! - `Authorization: Bearer <jwt>` を受け取り、署名 + exp (+ aud) を AuthService 側で検証する
//! - claim から IdentityContext を作り、request extensions に格納する
//! - 認可 (admin 判定など) はここではしない。route 側の gate / extractor の責務

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::state::AppState;

/// 認証が必要な router に middleware を適用する。
///
/// 例：
/// ```ignore
/// let protected = middleware::auth::access::apply(protected, state.clone());
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    router.route_layer(middleware::from_fn_with_state(state, access_middleware))
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("malformed authorization header".into()))?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or_else(|| AppError::Unauthorized("malformed authorization header".into()))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::Unauthorized("unsupported authorization scheme".into()));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::Unauthorized("missing bearer token".into()));
    }
    Ok(token)
}

pub async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).inspect_err(|err| {
        tracing::debug!(error = %err, path = %req.uri().path(), "request without usable bearer token");
    })?;

    let identity = match state.auth.validate(token).await {
        Ok(identity) => identity,
        Err(err) => {
            tracing::warn!(error = %err, path = %req.uri().path(), "access token rejected");
            return Err(err.into());
        }
    };

    tracing::debug!(sub = %identity.subject_id(), "access token accepted");

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        map
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(bearer_token(&headers("bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&headers("BEARER   abc ")).unwrap(), "abc");
    }

    #[test]
    fn rejects_missing_or_foreign_schemes() {
        assert!(matches!(bearer_token(&HeaderMap::new()), Err(AppError::Unauthorized(_))));
        assert!(matches!(bearer_token(&headers("Basic dXNlcjpwYXNz")), Err(AppError::Unauthorized(_))));
        assert!(matches!(bearer_token(&headers("Bearer")), Err(AppError::Unauthorized(_))));
        assert!(matches!(bearer_token(&headers("Bearer   ")), Err(AppError::Unauthorized(_))));
    }
}
