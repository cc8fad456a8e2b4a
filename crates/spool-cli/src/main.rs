//! spool: HTTP gateway, worker, queue monitor and load generator.

mod backend;
mod commands;
mod logging;
mod signal;

use clap::{Parser, Subcommand};

use backend::BackendKind;

#[derive(Parser)]
#[command(name = "spool")]
#[command(version, about = "Queue-backed chat gateway")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Job store and queue backend
        #[arg(long, value_enum, default_value_t = BackendKind::Redis)]
        backend: BackendKind,

        /// Run the worker pool inside the API process
        #[arg(long)]
        embedded_worker: bool,
    },

    /// Run a worker pool against the Redis queue
    Worker,

    /// Print queue depth and job counts at a fixed interval
    Monitor {
        /// Seconds between samples
        #[arg(long, default_value_t = 1.0)]
        interval: f64,

        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Send batches of concurrent chat requests to a running API
    LoadTest {
        /// Requests per batch
        #[arg(long, default_value_t = 10)]
        concurrency: usize,

        /// Total requests
        #[arg(long, default_value_t = 100)]
        requests: usize,

        /// Chat endpoint
        #[arg(long, default_value = "http://localhost:8000/chat")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init()?;

    match cli.command {
        Commands::Serve {
            backend,
            embedded_worker,
        } => commands::serve::run(backend, embedded_worker).await,
        Commands::Worker => commands::worker::run().await,
        Commands::Monitor { interval, duration } => {
            commands::monitor::run(interval, duration).await
        }
        Commands::LoadTest {
            concurrency,
            requests,
            url,
        } => commands::load_test::run(concurrency, requests, &url).await,
    }
}
