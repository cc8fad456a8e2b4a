use std::sync::Arc;

use spool_api::{AppState, ServerConfig};
use spool_core::ports::{Clock, SystemClock};
use spool_core::{AppBuilder, CoreConfig};

use crate::backend::{self, BackendKind, Maintenance};
use crate::signal::shutdown_signal;

pub async fn run(kind: BackendKind, embedded_worker: bool) -> anyhow::Result<()> {
    let core = CoreConfig::from_env()?;
    let server = ServerConfig::from_env()?;

    if kind == BackendKind::Memory && !embedded_worker {
        tracing::warn!("memory backend without --embedded-worker: nothing will process jobs");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend = backend::open(kind, &core, Arc::clone(&clock)).await?;

    let mut builder = AppBuilder::new()
        .store(backend.store)
        .queue(backend.queue)
        .clock(clock)
        .config(core);
    if embedded_worker {
        builder = builder.executor(super::gemini_executor()?);
    }
    let app = builder.build()?;

    let workers = if embedded_worker {
        Some((app.start_workers().await?, Maintenance::start(&app)))
    } else {
        None
    };

    let state = AppState {
        dispatcher: app.dispatcher(),
        monitor: app.monitor(),
        store: app.store(),
    };
    let served = spool_api::serve(&server, state, shutdown_signal()).await;

    if let Some((pool, maintenance)) = workers {
        let report = pool.shutdown().await;
        maintenance.stop().await;
        tracing::info!(forced = report.forced, aborted = report.aborted_slots, "embedded worker stopped");
    }

    served?;
    Ok(())
}
