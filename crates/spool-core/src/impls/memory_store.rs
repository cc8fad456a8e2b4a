//! InMemoryJobStore: job records in a `HashMap`, for single-process
//! deployments and tests.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{JobId, JobRecord, JobStatus, StoreError};
use crate::observability::StatusCounts;
use crate::ports::{JobStore, RecordMutator};

pub struct InMemoryJobStore {
    records: Mutex<HashMap<JobId, JobRecord>>,

    /// How long terminal records are kept.
    retention: Duration,
}

impl InMemoryJobStore {
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

    pub fn new(retention: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            retention,
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RETENTION)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, record: JobRecord) -> Result<JobId, StoreError> {
        let id = record.job_id;
        match self.records.lock().await.entry(id) {
            Entry::Occupied(_) => Err(StoreError::Corrupt(format!("job {id} already exists"))),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(id)
            }
        }
    }

    async fn get(&self, id: JobId) -> Result<JobRecord, StoreError> {
        self.records
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, id: JobId, mutate: RecordMutator) -> Result<JobRecord, StoreError> {
        let mut records = self.records.lock().await;
        let current = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        let mut next = current.clone();
        mutate(&mut next)?;
        *current = next.clone();
        Ok(next)
    }

    async fn counts(&self) -> Result<StatusCounts, StoreError> {
        let records = self.records.lock().await;
        let mut counts = StatusCounts::default();
        for record in records.values() {
            counts.increment(record.status);
        }
        Ok(counts)
    }

    async fn ids_with_status(&self, status: JobStatus) -> Result<Vec<JobId>, StoreError> {
        let records = self.records.lock().await;
        let mut ids: Vec<JobId> = records
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.job_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(self.retention, now));
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatMessage, JobArgs, RetryPolicy, TransitionError};
    use ulid::Ulid;

    fn record(now: DateTime<Utc>) -> JobRecord {
        JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            JobArgs::new(vec![ChatMessage::user("hi")]),
            RetryPolicy::default(),
            now,
        )
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = InMemoryJobStore::default();
        let job = record(Utc::now());
        let id = store.create(job.clone()).await.unwrap();

        assert_eq!(store.get(id).await.unwrap(), job);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = InMemoryJobStore::default();
        let job = record(Utc::now());
        store.create(job.clone()).await.unwrap();

        assert!(store.create(job).await.is_err());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = InMemoryJobStore::default();
        let id = JobId::from_ulid(Ulid::new());

        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(got)) if got == id));
    }

    #[tokio::test]
    async fn rejected_mutation_leaves_record_untouched() {
        let store = InMemoryJobStore::default();
        let job = record(Utc::now());
        let id = store.create(job.clone()).await.unwrap();

        // queued -> succeeded is not an edge
        let err = store
            .update(
                id,
                Box::new(|r| r.mark_succeeded("nope".into(), Utc::now())),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Transition(TransitionError { .. })));
        assert_eq!(store.get(id).await.unwrap(), job);
    }

    #[tokio::test]
    async fn counts_follow_transitions() {
        let store = InMemoryJobStore::default();
        let a = store.create(record(Utc::now())).await.unwrap();
        store.create(record(Utc::now())).await.unwrap();

        store
            .update(a, Box::new(|r| r.start_attempt(Utc::now()).map(|_| ())))
            .await
            .unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.running, 1);
        assert_eq!(store.ids_with_status(JobStatus::Running).await.unwrap(), vec![a]);
    }

    #[tokio::test]
    async fn purge_drops_only_expired_terminal_records() {
        let store = InMemoryJobStore::new(Duration::from_secs(60));
        let start = Utc::now();

        let done = store.create(record(start)).await.unwrap();
        let pending = store.create(record(start)).await.unwrap();
        store
            .update(
                done,
                Box::new(move |r| {
                    r.start_attempt(start)?;
                    r.mark_succeeded("ok".into(), start)
                }),
            )
            .await
            .unwrap();

        assert_eq!(store.purge_expired(start + chrono::Duration::seconds(30)).await.unwrap(), 0);
        assert_eq!(store.purge_expired(start + chrono::Duration::seconds(61)).await.unwrap(), 1);

        assert!(matches!(store.get(done).await, Err(StoreError::NotFound(_))));
        assert!(store.get(pending).await.is_ok());
    }
}
