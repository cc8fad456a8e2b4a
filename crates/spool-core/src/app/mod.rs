//! Application layer: ports combined into the running system.
//!
//! - **WorkerPool**: pop -> claim -> execute -> decide -> settle
//! - **Dispatcher / JobHandle**: enqueue and wait for outcomes
//! - **Monitor**: queue depth and job counts
//! - **GcLoop**: retention sweep
//! - **ReaperLoop**: recovery of jobs whose worker vanished
//! - **AppBuilder**: wiring with fail-fast validation

pub mod builder;
pub mod dispatcher;
pub mod gc_loop;
pub mod monitor;
pub mod reaper_loop;
pub mod worker_pool;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::dispatcher::{DispatchConfig, Dispatcher, JobHandle};
pub use self::gc_loop::GcLoop;
pub use self::monitor::{Monitor, QueueStats};
pub use self::reaper_loop::{ReapReport, ReaperLoop};
pub use self::worker_pool::{PoolConfig, ShutdownReport, WorkerDeps, WorkerPool};
