//! budgetd: the spend-quota enforcement daemon.
//!
//! Loads configuration from `COREASON_BUDGET_*` environment variables,
//! connects to the Redis counter store, and serves the enforcement API
//! until interrupted.

use std::process::ExitCode;
use std::sync::Arc;

use coreason_budget::{BudgetConfig, BudgetManager, server};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match BudgetConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("budgetd: {error}");
            return ExitCode::FAILURE;
        }
    };
    let addr = config.bind_addr().to_string();

    let manager = match BudgetManager::connect(config).await {
        Ok(manager) => Arc::new(manager),
        Err(error) => {
            tracing::error!(error = %error, "failed to connect to the counter store");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = server::serve(manager, &addr).await {
        tracing::error!(error = %error, "server exited with an error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("coreason_budget=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
