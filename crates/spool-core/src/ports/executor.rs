use async_trait::async_trait;

use crate::domain::{ExecutorError, JobArgs};

/// Performs the actual work for one attempt.
///
/// Implementations must not touch job records; the worker pool owns every
/// state change. Timeouts are enforced by the caller.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    async fn execute(&self, args: &JobArgs) -> Result<String, ExecutorError>;
}
