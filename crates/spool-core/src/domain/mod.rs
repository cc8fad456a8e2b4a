//! Domain model: job identifiers, records, the state machine and outcomes.
//!
//! Nothing here knows about queues, workers or persistence.

pub mod decision;
pub mod errors;
pub mod ids;
pub mod job;
pub mod message;
pub mod outcome;
pub mod retry;
pub mod state;

pub use decision::{Decider, RetryDecider};
pub use errors::{
    BackendError, ConfigError, DispatchError, ExecutorError, QueueError, StoreError,
    TransitionError, WaitError,
};
pub use ids::JobId;
pub use job::JobRecord;
pub use message::{ChatMessage, JobArgs};
pub use outcome::{AttemptResult, FailureKind, JobFailure, JobOutcome};
pub use retry::{JobOptions, RetryPolicy};
pub use state::JobStatus;
