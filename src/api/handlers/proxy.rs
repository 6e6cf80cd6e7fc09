/*
 * Responsibility
 * - route table に載っている全コレクション共通の dispatcher
 * - access (public / authenticated / capability) を確認 → upstream URL を組み立て → forward
 * - upstream の status / header / body はそのまま返す (変換しない)
 */
use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response};

use crate::api::extractors::IdentityContext;
use crate::api::route_table::{Access, ProxyRoute};
use crate::error::AppError;
use crate::services::auth::gate;
use crate::services::proxy;
use crate::state::AppState;

pub async fn dispatch(
    state: AppState,
    route: Arc<ProxyRoute>,
    req: Request<Body>,
) -> Result<Response, AppError> {
    // Public routes never run the access middleware, so there is no identity to forward.
    let identity = match route.access {
        Access::Public => None,
        Access::Authenticated | Access::Capability(_) => {
            let ctx = req
                .extensions()
                .get::<IdentityContext>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized("not authenticated".into()))?;
            if let Access::Capability(capability) = route.access {
                gate::require(&ctx, capability)?;
            }
            Some(ctx)
        }
    };

    let base = state.upstreams.base(route.target.upstream);
    let url = route.target.upstream_url(base, req.uri())?;

    let res = proxy::forward(&state.upstream, url, req, identity.as_ref(), route.forwarding).await?;
    Ok(res)
}
