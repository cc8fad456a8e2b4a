use std::sync::Arc;

use spool_core::ports::{Clock, SystemClock};
use spool_core::{AppBuilder, CoreConfig};

use crate::backend::{self, BackendKind, Maintenance};
use crate::signal::shutdown_signal;

/// Standalone worker process. Always Redis: a memory queue would be
/// invisible to the API.
pub async fn run() -> anyhow::Result<()> {
    let core = CoreConfig::from_env()?;
    let executor = super::gemini_executor()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend = backend::open(BackendKind::Redis, &core, Arc::clone(&clock)).await?;
    backend.store.ping().await?;

    let app = AppBuilder::new()
        .store(backend.store)
        .queue(backend.queue)
        .executor(executor)
        .clock(clock)
        .config(core)
        .build()?;

    let pool = app.start_workers().await?;
    let maintenance = Maintenance::start(&app);

    shutdown_signal().await;

    let report = pool.shutdown().await;
    maintenance.stop().await;
    if report.forced {
        tracing::warn!(aborted = report.aborted_slots, "worker stopped with jobs still running");
    } else {
        tracing::info!("worker stopped");
    }
    Ok(())
}
