//! Ports: the seams between the worker core and its backends.

pub mod clock;
pub mod executor;
pub mod hooks;
pub mod id_generator;
pub mod job_queue;
pub mod job_store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use executor::TaskExecutor;
pub use hooks::{LifecycleHooks, LoggingHooks};
pub use id_generator::{IdGenerator, UlidGenerator};
pub use job_queue::{JobQueue, QueueEntry};
pub use job_store::{JobStore, RecordMutator};
