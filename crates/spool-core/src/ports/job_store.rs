//! JobStore port.
//!
//! The store is the single source of truth for job records. Writes go
//! through `update` with a mutator so every backend applies state changes
//! the same way: the mutator runs against a copy and the copy is committed
//! only when it returns `Ok`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{JobId, JobRecord, JobStatus, StoreError, TransitionError};
use crate::observability::StatusCounts;

/// May run more than once when a backend retries on a concurrent write.
pub type RecordMutator =
    Box<dyn Fn(&mut JobRecord) -> Result<(), TransitionError> + Send + Sync>;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new record. Fails if the ID already exists.
    async fn create(&self, record: JobRecord) -> Result<JobId, StoreError>;

    /// `StoreError::NotFound` when the record is absent or already purged.
    async fn get(&self, id: JobId) -> Result<JobRecord, StoreError>;

    /// Atomically read, mutate and write back a record. Returns the
    /// committed record. A rejected mutation leaves the stored record as is.
    async fn update(&self, id: JobId, mutate: RecordMutator) -> Result<JobRecord, StoreError>;

    async fn counts(&self) -> Result<StatusCounts, StoreError>;

    async fn ids_with_status(&self, status: JobStatus) -> Result<Vec<JobId>, StoreError>;

    /// Remove terminal records older than the retention window.
    /// Returns the number removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
