use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::{Instant, MissedTickBehavior};

use spool_core::ports::{Clock, SystemClock};
use spool_core::{CoreConfig, Monitor, QueueStats};

use crate::backend::{self, BackendKind};

pub async fn run(interval: f64, duration: Option<f64>) -> anyhow::Result<()> {
    let interval = Duration::try_from_secs_f64(interval)
        .ok()
        .filter(|d| !d.is_zero())
        .context("--interval must be a positive number of seconds")?;
    let deadline = duration
        .map(|secs| Duration::try_from_secs_f64(secs).context("--duration must be non-negative"))
        .transpose()?
        .map(|d| Instant::now() + d);

    let core = CoreConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend = backend::open(BackendKind::Redis, &core, Arc::clone(&clock)).await?;
    let monitor = Monitor::new(backend.store, backend.queue, clock);

    println!("{}", QueueStats::header());
    println!("{}", QueueStats::rule());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let until_deadline = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(until_deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                println!();
                break;
            }
            () = &mut until_deadline => break,
        }

        // A slow backend must not hold off Ctrl-C or the deadline.
        tokio::select! {
            read = monitor.snapshot() => match read {
                Ok(stats) => println!("{}", stats.row()),
                Err(err) => tracing::error!(error = %err, "failed to read queue stats"),
            },
            _ = &mut ctrl_c => {
                println!();
                break;
            }
            () = &mut until_deadline => break,
        }
    }

    Ok(())
}
