//! spool-core
//!
//! Job queue execution core: the job state machine, the store/queue/executor
//! ports, in-memory backends, and the worker pool and dispatcher built on them.
//!
//! - **domain**: ids, records, state machine, outcomes, errors
//! - **ports**: `JobStore`, `JobQueue`, `TaskExecutor`, `Clock`, `IdGenerator`, hooks
//! - **impls**: in-memory store and queue
//! - **app**: worker pool, dispatcher, monitor, gc, reaper, builder
//! - **config**: environment-sourced settings

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{App, AppBuilder, Dispatcher, JobHandle, Monitor, QueueStats, WorkerPool};
pub use config::CoreConfig;
pub use observability::StatusCounts;
