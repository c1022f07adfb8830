//! HTTP front end
//!
//! Two classification routes, one per backend, plus a health report.
//! Models are loaded before the listener binds and released after the
//! last connection drains.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::registry::ModelRegistry;

/// Load models, serve until ctrl+c, then unload
pub async fn run_server(config: ServiceConfig) -> anyhow::Result<()> {
    config.validate()?;
    let start_time = chrono::Utc::now();
    info!(
        environment = %config.environment,
        model_dir = %config.model_dir.display(),
        started_at = %start_time.to_rfc3339(),
        "Starting shape classification service"
    );

    let registry = Arc::new(ModelRegistry::new());
    {
        let registry = Arc::clone(&registry);
        let config = config.clone();
        tokio::task::spawn_blocking(move || registry.load(&config)).await??;
    }
    for status in registry.status() {
        if !status.is_ready() {
            warn!(
                backend = %status.backend,
                reason = status.error.as_deref().unwrap_or("unknown"),
                "Backend unavailable, its endpoint will answer 503"
            );
        }
    }

    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&registry)));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        pid = std::process::id(),
        "Server listening and ready to accept connections"
    );
    info!(url = %format!("http://{}/health", addr), "Health endpoint available");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
        let stop_time = chrono::Utc::now();
        let uptime = stop_time.signed_duration_since(start_time);
        info!(
            stopped_at = %stop_time.to_rfc3339(),
            uptime_secs = uptime.num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await;

    // release models even when serving failed
    if let Err(e) = registry.unload() {
        warn!(error = %e, "Model unload skipped");
    }
    served?;

    info!("Server shut down cleanly");
    Ok(())
}
