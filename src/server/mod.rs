//! Budget HTTP service built on axum.
//!
//! Exposes the two-phase enforcement protocol over three routes:
//! `POST /check`, `POST /spend`, and `GET /health`.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::BudgetResult;
use crate::manager::BudgetManager;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Manager backing every route.
    pub manager: Arc<BudgetManager>,
}

/// Build the service router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/check", post(handlers::post_check))
        .route("/spend", post(handlers::post_spend))
        .route("/health", get(handlers::get_health))
        .with_state(state)
}

/// Bind `addr` and serve until a shutdown signal arrives.
pub async fn serve(manager: Arc<BudgetManager>, addr: &str) -> BudgetResult<()> {
    let app = router(AppState { manager });
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("budget server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(error) => {
            tracing::error!(error = %error, "failed to listen for shutdown signal");
            // Without a signal handler the server just runs until killed.
            std::future::pending::<()>().await;
        }
    }
}
