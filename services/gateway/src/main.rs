mod config;
mod connection;
mod error;
mod feed_listener;
mod handlers;
mod protocol;
mod registry;
mod router;
mod state;

use std::sync::Arc;

use market_data::service::MarketService;
use router::create_router;
use state::AppState;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = config::GatewayConfig::from_env();
    tracing::info!(
        listen = %config.listen_addr,
        feed = %config.feed_addr,
        outbox_capacity = config.outbox_capacity,
        policy = ?config.overflow_policy,
        "Starting quotefeed gateway"
    );

    // Wire the market service and the gateway together
    let service = Arc::new(MarketService::new());
    let state = AppState::new(Arc::clone(&service), config.clone());

    // Upstream feed intake
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed = tokio::spawn(feed_listener::run_feed_listener(
        config.feed_addr,
        service,
        shutdown_rx,
    ));

    // Client surface
    let app = create_router(state.clone());
    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Listening on {}", config.listen_addr);

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received, draining");
            let _ = shutdown_tx.send(true);
            shutdown_state.close_all_connections();
        })
        .await?;

    feed.await??;
    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install ctrl-c handler");
    }
}
