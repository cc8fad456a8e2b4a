//! GcLoop: removes terminal job records past their retention window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::domain::StoreError;
use crate::ports::{Clock, JobStore};

pub struct GcLoop {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl GcLoop {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval,
        }
    }

    /// One sweep. Returns the number of records removed.
    pub async fn run_once(&self) -> Result<usize, StoreError> {
        let purged = self.store.purge_expired(self.clock.now()).await?;
        if purged > 0 {
            tracing::info!(purged, "expired job records removed");
        }
        Ok(purged)
    }

    /// Sweep every `interval` until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        tracing::warn!(error = %err, "job record gc failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("gc loop stopped");
    }
}
