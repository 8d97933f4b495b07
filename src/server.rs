use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use log::{error, info};
use tower_http::cors::{Any, CorsLayer};

use crate::commands;
use crate::state::CaptionerState;

/// Any origin may call us; the browser UI is not necessarily served from this host.
pub fn cors() -> CorsLayer
{
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn router(state: CaptionerState, body_limit: usize) -> Router
{
    Router::new()
        .route("/", get(commands::index))
        .route("/health", get(commands::health))
        .route("/caption", post(commands::caption))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, app: Router) -> anyhow::Result<()>
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal()
{
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            // Without a signal handler we can only be stopped by killing the process.
            error!("Unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
