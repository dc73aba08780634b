//! Arbiter Server - always-on route conflict arbitration

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arbiter_planner::{HttpPathSource, PlannerClient, PlannerTimeouts};
use arbiter_server::api;
use arbiter_server::config::Config;
use arbiter_server::loops::arbiter_loop::{run_arbiter_loop, ArbiterDeps};
use arbiter_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    tracing::info!("Starting Arbiter Server...");

    let config = Config::from_env().context("Invalid configuration")?;
    let port = config.server_port;
    tracing::info!(
        "Arbitrating {} agent(s) every {:?} with a {} m safety radius",
        config.agents.len(),
        config.poll_interval,
        config.rules.safety_radius_m
    );

    let paths = HttpPathSource::new(&config.path_source_url, config.path_timeout)?;
    let planner = PlannerClient::new(PlannerTimeouts {
        candidates: config.candidates_timeout,
        recommendation: config.recommendation_timeout,
    })?;
    let deps = ArbiterDeps::new(config, Arc::new(paths), Arc::new(planner))
        .context("Invalid arbitration settings")?;
    let state = Arc::new(AppState::new());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let arbiter = tokio::spawn(run_arbiter_loop(
        state.clone(),
        Arc::new(deps),
        shutdown_tx.subscribe(),
    ));

    let app = api::routes()
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let stop = shutdown_tx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Feeds and the loop stop first, then serve drains connections
            state.begin_shutdown();
            let _ = stop.send(());
        })
        .await?;

    if let Err(e) = arbiter.await {
        tracing::error!("Arbiter loop ended abnormally: {}", e);
    }
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("arbiter_server=debug".parse()?);
    let json = env::var("ARBITER_LOG_JSON")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
