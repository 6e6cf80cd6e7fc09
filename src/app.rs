/*
 * Responsibility
 * - tracing 初期化 / panic hook
 * - Config読み込み → 依存生成 (AppState) → Router 組み立て
 * - Middleware の適用 (CORS / request-id / trace / body limit)
 * - axum::serve() で起動 (Ctrl-C / SIGTERM で graceful shutdown)
 */
use anyhow::Result;
use axum::Router;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{self, RouteTable},
    config::{AppEnv, Config},
    middleware,
    state::AppState,
};

pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    install_panic_hook(config.app_env);

    let state = AppState::from_config(&config)?;
    let app = build_router(state, &config);

    tracing::info!(
        addr = %config.addr,
        env = ?config.app_env,
        api_prefix = %config.api_prefix,
        soil = %config.upstream.soil_api_url,
        objects = %config.upstream.deepreefmap_api_url,
        submissions = %config.upstream.eceo_api_url,
        "starting eceo-bff"
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let table = RouteTable::standard(&config.api_prefix);
    let app = api::router(state, &config.api_prefix, &table, config.upstream.timeout);

    let app = middleware::http::apply(app, config);
    middleware::cors::apply(app, config)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    // A second init (e.g. from tests) is not an error worth failing on.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn install_panic_hook(env: AppEnv) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "panic");
        default_hook(info);
        // Fail fast while developing.
        if !env.is_production() {
            std::process::abort();
        }
    }));
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
