//! Versus Back binary entrypoint wiring the WebSocket engine and Postgres store.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use versus_back::{
    config::AppConfig,
    dao::challenge_store::postgres::{PgChallengeStore, PgConfig},
    routes,
    services::janitor,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("loading configuration")?;

    let store = PgChallengeStore::connect(PgConfig::new(config.database_url.clone()))
        .await
        .context("connecting to postgres")?;
    let state = AppState::new(Arc::new(store));

    state
        .store()
        .health_check()
        .await
        .context("postgres health check")?;

    // A stale nomination cache is worse than no service; abort bring-up.
    janitor::warm_nomination_cache(&state)
        .await
        .context("warming nomination cache")?;

    let janitor_task = tokio::spawn(janitor::run(state.clone()));

    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;

    // On the termination signal the open sockets get a close frame; the
    // graceful drain below then waits for their tasks to wind down.
    let drain_state = state.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received; draining connections");
            drain_state.close_all_connections("Server shutting down");
        })
        .await
        .context("serving axum")?;

    janitor_task.abort();
    info!("shutdown complete");

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
