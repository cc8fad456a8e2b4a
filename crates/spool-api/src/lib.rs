//! spool-api
//!
//! HTTP front of the job queue: `POST /chat`, `GET /health`, `GET /stats`.

pub mod config;
pub mod error;
pub mod router;
pub mod routes;
pub mod state;

use std::future::Future;

pub use config::ServerConfig;
pub use error::{AppError, AppResult};
pub use router::build_app_router;
pub use state::AppState;

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    config: &ServerConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = config
        .bind_addr()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http server listening");

    axum::serve(listener, build_app_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
