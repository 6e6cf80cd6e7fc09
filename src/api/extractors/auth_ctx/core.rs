use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::auth::gate::{self, ADMIN};

use super::IdentityContext;

/// Handler で IdentityContext を受け取るための extractor
/// middleware が IdentityContext を request.extensions() に insert 済みである前提
/// 見つからない場合は 401 を返す（認証がかかってない・ミドルウェア未設定）
#[derive(Debug, Clone)]
pub struct Identity(pub IdentityContext);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<IdentityContext>()
            .cloned()
            .map(Identity)
            .ok_or_else(|| AppError::Unauthorized("not authenticated".into()))
    }
}

/// Same as [`Identity`], additionally gated on the `admin` realm role (403 otherwise).
#[derive(Debug, Clone)]
pub struct AdminIdentity(pub IdentityContext);

impl<S> FromRequestParts<S> for AdminIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Identity(ctx) = Identity::from_request_parts(parts, state).await?;
        gate::require(&ctx, ADMIN)?;
        Ok(AdminIdentity(ctx))
    }
}
