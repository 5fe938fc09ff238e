//! metricount function host
//!
//! - Resolves configuration from the environment once, at startup
//! - Serves invocations at `POST /invoke` against the embedded engine
//! - `/healthz` and `/metrics` for operations

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use metricount_function::{app_state, config, db::MemoryConnector, router};

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = match config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "config load failed");
            return ExitCode::FAILURE;
        }
    };
    let listen: SocketAddr = match cfg.listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(listen = %cfg.listen, error = %e, "function.listen must be a valid SocketAddr");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        %listen,
        endpoint = %cfg.connection.endpoint,
        database = %cfg.connection.database,
        table = %cfg.table,
        backend_version = %cfg.backend_version,
        "metricount-function starting"
    );

    let state = app_state::AppState::new(cfg, Arc::new(MemoryConnector::new()));
    let app = router::build_router(state);

    let listener = match tokio::net::TcpListener::bind(listen).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%listen, error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
