/*
 * Responsibility
 * - Config読み込み → tracing 初期化 → 鍵セット取得 (失敗なら起動しない) → Router 組み立て
 * - Middleware の適用 (http 共通 / ルート単位の Bearer + scope)
 * - axum::serve() で起動、SIGINT/SIGTERM で graceful shutdown (最大 5 秒で打ち切り)
 */
use std::future::IntoFuture;
use std::panic;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppEnv, Config};
use crate::services::auth::build_authenticator;
use crate::state::AppState;
use crate::{api, middleware};

// Upper bound on draining in-flight requests once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn init_tracing(app_env: AppEnv) {
    // Prefer RUST_LOG if set; otherwise a default per environment.
    // Ex:
    // RUST_LOG=info,evaluation_service=debug,tower_http=debug cargo run
    let default_filter = if app_env.is_production() {
        "info,tower_http=info"
    } else {
        "info,evaluation_service=debug,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// Panics inside handlers are turned into 500s by CatchPanicLayer, so the hook
// only records them. Aborting here would take the whole server down first.
fn init_panic_hook() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");
        default_hook(info);
    }))
}

pub async fn run() -> Result<()> {
    let config = Config::from_env().context("failed to load config")?;
    init_tracing(config.app_env);
    init_panic_hook();

    tracing::info!(
        "starting evaluation-service in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let shutdown = CancellationToken::new();

    // Fail-fast: protected routes are never served without an initial key set.
    let auth = build_authenticator(&config, shutdown.clone())
        .await
        .context("failed to create authenticator")?;

    let state = AppState::new(auth);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    tokio::spawn(watch_shutdown_signals(shutdown.clone()));

    serve(listener, app, shutdown.clone(), SHUTDOWN_GRACE).await?;

    // Stops the key set refresh task if the server exited on its own.
    shutdown.cancel();
    tracing::info!("server stopped");

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    async fn health() -> &'static str {
        "ok"
    }

    let router = Router::new()
        .route("/health", get(health))
        .nest("/api", api::routes(&state))
        .with_state(state);

    middleware::http::apply(router)
}

/// Serve `app` until `shutdown` is cancelled, then give in-flight requests
/// at most `grace` to finish.
pub async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server);

    let deadline = async {
        shutdown.cancelled().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        res = &mut server => res.context("server error")?,
        _ = deadline => {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "in-flight requests did not finish in time, forcing shutdown"
            );
        }
    }

    Ok(())
}

async fn watch_shutdown_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
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
        _ = shutdown.cancelled() => return,
    }

    tracing::info!("shutting down server...");
    shutdown.cancel();
}
