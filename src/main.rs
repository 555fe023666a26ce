//! Stakebook server
//! Mission: Hold stakes in custody and settle them exactly once

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stakebook_backend::{
    api::{create_router, AppState},
    auth::{AuthState, JwtHandler, UserStore},
    config::Config,
    ledger::LedgerStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::from_env()?;
    info!("Stakebook starting (fee rate {})", config.fee_rate);

    let ledger_path = resolve_data_path(&config.db_path);
    let store = LedgerStore::new(&ledger_path)
        .with_context(|| format!("Failed to open ledger at {}", ledger_path))?;
    info!("Ledger initialized at: {}", ledger_path);

    let auth_db_path = resolve_data_path(&config.auth_db_path);
    let user_store = Arc::new(UserStore::new(&auth_db_path)?);
    let jwt_handler = Arc::new(JwtHandler::new(config.jwt_secret.clone()));
    let auth_state = AuthState::new(user_store, jwt_handler);
    info!("Authentication initialized at: {}", auth_db_path);

    let app_state = AppState::new(store, config.fee_rate, config.fx()?)
        .context("Failed to build application state")?;
    let app = create_router(app_state, auth_state);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("API server listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stakebook_backend=debug,stakebook=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

/// Relative paths are anchored at the crate directory, not the caller's cwd.
fn resolve_data_path(raw: &str) -> String {
    let p = PathBuf::from(raw);
    if p.is_absolute() || raw == ":memory:" {
        return raw.to_string();
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join(p)
        .to_string_lossy()
        .to_string()
}

fn load_env() {
    // Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // Also the crate's own .env when launched from elsewhere
    let candidate = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
