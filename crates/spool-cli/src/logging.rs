//! Tracing setup.
//!
//!   LOG_FORMAT  - "json" or "text" (default: "text")
//!   LOG_FILE    - path of a daily-rotated log file; stderr when unset
//!   RUST_LOG    - env filter (default: "spool=info,tower_http=info")

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "spool=info,spool_core=info,spool_redis=info,spool_llm=info,spool_api=info,tower_http=info";

/// Install the global subscriber. Keep the guard alive until exit so
/// buffered file output is flushed.
pub fn init() -> anyhow::Result<Option<WorkerGuard>> {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let log_file = std::env::var("LOG_FILE").ok().filter(|v| !v.trim().is_empty());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    let guard = match log_file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("spool.log");
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            if json {
                registry.with(layer.json()).try_init()?;
            } else {
                registry.with(layer).try_init()?;
            }
            Some(guard)
        }
        None => {
            let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if json {
                registry.with(layer.json()).try_init()?;
            } else {
                registry.with(layer).try_init()?;
            }
            None
        }
    };

    tracing::debug!(
        json,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "logging initialized"
    );
    Ok(guard)
}
