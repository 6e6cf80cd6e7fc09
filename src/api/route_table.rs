/*
 * Responsibility
 * - proxy するコレクションごとの route 定義 (データとして持つ)
 *   - verb + path → upstream target / 必要な capability / identity header / pagination
 * - RouteTable から axum Router を組み立てる (handler は 1 つの dispatcher だけ)
 *
 * Notes
 * - 認証は route 単位で route_layer (access middleware) を掛ける
 *   public な GET と admin の POST が同じ path に並ぶため
 * - 認可 (capability) は dispatcher 側で gate を通す
 */
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::from_fn_with_state,
    routing::{MethodFilter, MethodRouter, on},
};

use crate::api::handlers::proxy::dispatch;
use crate::middleware::auth::access_middleware;
use crate::services::auth::gate::ADMIN;
use crate::services::proxy::{Forwarding, IdentityHeaders, ProxyTarget, Upstream};
use crate::state::AppState;

/// Who may call a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    /// Authenticated and holding this realm role.
    Capability(&'static str),
}

#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub method: MethodFilter,
    // relative to the collection prefix; "" is the collection itself
    pub path: &'static str,
    pub access: Access,
    pub paginated: bool,
}

impl RouteEntry {
    pub fn new(method: MethodFilter, path: &'static str, access: Access) -> Self {
        Self {
            method,
            path,
            access,
            paginated: false,
        }
    }

    pub fn paginated(mut self) -> Self {
        self.paginated = true;
        self
    }
}

/// One proxied collection.
#[derive(Debug, Clone)]
pub struct RouteGroup {
    pub target: ProxyTarget,
    pub identity_headers: IdentityHeaders,
    pub entries: Vec<RouteEntry>,
}

/// What the dispatcher needs for one registered route.
#[derive(Debug, Clone)]
pub struct ProxyRoute {
    pub target: ProxyTarget,
    pub access: Access,
    pub forwarding: Forwarding,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    pub groups: Vec<RouteGroup>,
}

// GET list/one public, mutations admin-only.
fn public_read_admin_write(read: Access) -> Vec<RouteEntry> {
    let admin = Access::Capability(ADMIN);
    vec![
        RouteEntry::new(MethodFilter::GET, "", read).paginated(),
        RouteEntry::new(MethodFilter::GET, "/{id}", read),
        RouteEntry::new(MethodFilter::POST, "", admin),
        RouteEntry::new(MethodFilter::PUT, "/{id}", admin),
        RouteEntry::new(MethodFilter::DELETE, "/{id}", admin),
    ]
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(
        mut self,
        target: ProxyTarget,
        identity_headers: IdentityHeaders,
        entries: Vec<RouteEntry>,
    ) -> Self {
        self.groups.push(RouteGroup {
            target,
            identity_headers,
            entries,
        });
        self
    }

    /// The collections this BFF exposes, mounted under `api_prefix`.
    pub fn standard(api_prefix: &str) -> Self {
        let public = |collection: &str| format!("{}/{}", api_prefix, collection);
        let auth = Access::Authenticated;
        let admin = Access::Capability(ADMIN);

        Self::new()
            .group(
                ProxyTarget::new(Upstream::Soil, public("areas"), "/v1/areas"),
                IdentityHeaders::None,
                vec![
                    RouteEntry::new(MethodFilter::GET, "", Access::Public),
                    RouteEntry::new(MethodFilter::GET, "/", Access::Public),
                ],
            )
            .group(
                ProxyTarget::new(Upstream::Soil, public("sensors"), "/v1/sensors"),
                IdentityHeaders::Roles,
                public_read_admin_write(Access::Public),
            )
            .group(
                ProxyTarget::new(Upstream::Soil, public("sensordata"), "/v1/sensors/data"),
                IdentityHeaders::Roles,
                public_read_admin_write(Access::Public),
            )
            .group(
                ProxyTarget::new(Upstream::Objects, public("transects"), "/v1/transects"),
                IdentityHeaders::AdminFlag,
                vec![
                    RouteEntry::new(MethodFilter::GET, "", auth).paginated(),
                    RouteEntry::new(MethodFilter::GET, "/{id}", auth),
                    RouteEntry::new(MethodFilter::POST, "", auth),
                    RouteEntry::new(MethodFilter::POST, "/batch", auth),
                    RouteEntry::new(MethodFilter::PUT, "/{id}", auth),
                    RouteEntry::new(MethodFilter::DELETE, "/{id}", auth),
                ],
            )
            .group(
                ProxyTarget::new(Upstream::Objects, public("objects"), "/v1/objects"),
                IdentityHeaders::AdminFlag,
                vec![
                    RouteEntry::new(MethodFilter::GET, "", auth).paginated(),
                    RouteEntry::new(MethodFilter::GET, "/{id}", auth),
                    // regenerate statistics
                    RouteEntry::new(MethodFilter::POST, "/{id}", auth),
                    RouteEntry::new(MethodFilter::PUT, "/{id}", auth),
                    RouteEntry::new(MethodFilter::DELETE, "/{id}", auth),
                    // chunked upload: create, append (?patch=), probe (?patch=), cancel
                    RouteEntry::new(MethodFilter::POST, "/upload", auth),
                    RouteEntry::new(MethodFilter::PATCH, "/upload", auth),
                    RouteEntry::new(MethodFilter::HEAD, "/upload", auth),
                    RouteEntry::new(MethodFilter::DELETE, "/upload", auth),
                ],
            )
            .group(
                ProxyTarget::new(Upstream::Objects, public("status"), "/v1/status"),
                IdentityHeaders::AdminFlag,
                vec![RouteEntry::new(MethodFilter::GET, "", auth)],
            )
            .group(
                ProxyTarget::new(
                    Upstream::Submissions,
                    public("submissions"),
                    "/v1/deepreef/submissions",
                ),
                IdentityHeaders::Roles,
                vec![
                    RouteEntry::new(MethodFilter::GET, "", auth).paginated(),
                    RouteEntry::new(MethodFilter::GET, "/{id}", auth),
                    RouteEntry::new(MethodFilter::POST, "", admin),
                    RouteEntry::new(MethodFilter::POST, "/many", admin),
                    RouteEntry::new(MethodFilter::PUT, "/{id}", admin),
                    RouteEntry::new(MethodFilter::DELETE, "/{id}", admin),
                ],
            )
            .group(
                ProxyTarget::new(
                    Upstream::Objects,
                    public("submission_job_logs"),
                    "/v1/submissions/logs",
                ),
                IdentityHeaders::Roles,
                vec![RouteEntry::new(MethodFilter::GET, "/{id}", auth)],
            )
    }

    /// One axum route per distinct path; verbs on the same path are merged.
    pub fn router(&self, state: &AppState) -> Router<AppState> {
        let mut by_path: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();

        for group in &self.groups {
            for entry in &group.entries {
                let path = format!("{}{}", group.target.public_prefix, entry.path);
                let route = Arc::new(ProxyRoute {
                    target: group.target.clone(),
                    access: entry.access,
                    forwarding: Forwarding {
                        identity_headers: group.identity_headers,
                        paginated: entry.paginated,
                    },
                });

                let handler = move |State(state): State<AppState>, req: Request<Body>| async move {
                    dispatch(state, route, req).await
                };

                let mut method_router = on(entry.method, handler);
                if entry.access != Access::Public {
                    method_router = method_router
                        .route_layer(from_fn_with_state(state.clone(), access_middleware));
                }

                let merged = match by_path.remove(&path) {
                    Some(existing) => existing.merge(method_router),
                    None => method_router,
                };
                by_path.insert(path, merged);
            }
        }

        by_path
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(&path, method_router)
            })
    }
}
