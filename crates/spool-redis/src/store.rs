//! RedisJobStore: job records as JSON strings plus per-status ID sets.
//!
//! Writes that touch a record and its status index run as Lua scripts so
//! both change together. `update` is optimistic: read, mutate locally,
//! then compare-and-set against the exact JSON that was read. A lost race
//! re-reads and runs the mutator again.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use spool_core::StatusCounts;
use spool_core::domain::{JobId, JobRecord, JobStatus, StoreError};
use spool_core::ports::{JobStore, RecordMutator};

use crate::keys::KeySpace;

/// KEYS: job, status set. ARGV: json, member.
const CREATE_SCRIPT: &str = r#"
if redis.call('SET', KEYS[1], ARGV[1], 'NX') then
  redis.call('SADD', KEYS[2], ARGV[2])
  return 1
end
return 0
"#;

/// KEYS: job, old status set, new status set.
/// ARGV: expected json, new json, member, ttl seconds (0 = keep).
const CAS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) ~= ARGV[1] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[2])
if tonumber(ARGV[4]) > 0 then
  redis.call('EXPIRE', KEYS[1], ARGV[4])
end
if KEYS[2] ~= KEYS[3] then
  redis.call('SREM', KEYS[2], ARGV[3])
  redis.call('SADD', KEYS[3], ARGV[3])
end
return 1
"#;

const MAX_CAS_ATTEMPTS: usize = 16;

pub(crate) fn unavailable(err: redis::RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

pub(crate) fn encode(record: &JobRecord) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|e| StoreError::Corrupt(e.to_string()))
}

pub(crate) fn decode(raw: &str) -> Result<JobRecord, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// TTL applied when a record is written in `status`. Only terminal records
/// expire.
pub(crate) fn ttl_for(status: JobStatus, retention: Duration) -> u64 {
    if status.is_terminal() {
        retention.as_secs().max(1)
    } else {
        0
    }
}

#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
    keys: KeySpace,
    retention: Duration,
    create_script: redis::Script,
    cas_script: redis::Script,
}

impl RedisJobStore {
    pub fn new(conn: ConnectionManager, keys: KeySpace, retention: Duration) -> Self {
        Self {
            conn,
            keys,
            retention,
            create_script: redis::Script::new(CREATE_SCRIPT),
            cas_script: redis::Script::new(CAS_SCRIPT),
        }
    }

    async fn raw(&self, id: JobId) -> Result<String, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.keys.job(id)).await.map_err(unavailable)?;
        raw.ok_or(StoreError::NotFound(id))
    }

    async fn members(&self, status: JobStatus) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.smembers(self.keys.status(status))
            .await
            .map_err(unavailable)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, record: JobRecord) -> Result<JobId, StoreError> {
        let id = record.job_id;
        let json = encode(&record)?;
        let mut conn = self.conn.clone();

        let created: i64 = self
            .create_script
            .key(self.keys.job(id))
            .key(self.keys.status(record.status))
            .arg(json)
            .arg(id.as_ulid().to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        if created == 1 {
            Ok(id)
        } else {
            Err(StoreError::Corrupt(format!("job {id} already exists")))
        }
    }

    async fn get(&self, id: JobId) -> Result<JobRecord, StoreError> {
        decode(&self.raw(id).await?)
    }

    async fn update(&self, id: JobId, mutate: RecordMutator) -> Result<JobRecord, StoreError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let raw = self.raw(id).await?;
            let current = decode(&raw)?;
            let mut next = current.clone();
            mutate(&mut next)?;

            let mut conn = self.conn.clone();
            let swapped: i64 = self
                .cas_script
                .key(self.keys.job(id))
                .key(self.keys.status(current.status))
                .key(self.keys.status(next.status))
                .arg(&raw)
                .arg(encode(&next)?)
                .arg(id.as_ulid().to_string())
                .arg(ttl_for(next.status, self.retention))
                .invoke_async(&mut conn)
                .await
                .map_err(unavailable)?;

            if swapped == 1 {
                return Ok(next);
            }
            tracing::debug!(%id, "concurrent write on job record, retrying update");
        }
        Err(StoreError::Conflict(id))
    }

    async fn counts(&self) -> Result<StatusCounts, StoreError> {
        // MULTI, so a record moving between status sets is counted once
        let mut pipe = redis::pipe();
        pipe.atomic();
        for status in JobStatus::ALL {
            pipe.scard(self.keys.status(status));
        }
        let mut conn = self.conn.clone();
        let sizes: Vec<usize> = pipe.query_async(&mut conn).await.map_err(unavailable)?;

        let mut counts = StatusCounts::default();
        for (status, size) in JobStatus::ALL.into_iter().zip(sizes) {
            counts.set(status, size);
        }
        Ok(counts)
    }

    async fn ids_with_status(&self, status: JobStatus) -> Result<Vec<JobId>, StoreError> {
        let mut ids = Vec::new();
        for member in self.members(status).await? {
            match member.parse::<JobId>() {
                Ok(id) => ids.push(id),
                Err(err) => tracing::warn!(%member, error = %err, "skipping malformed status index entry"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Records expire through their TTL. This sweeps index entries whose
    /// record is gone so `counts` stays accurate.
    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = 0;
        for status in JobStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            let members = self.members(status).await?;
            if members.is_empty() {
                continue;
            }

            let mut pipe = redis::pipe();
            for member in &members {
                pipe.exists(format!("{}:job:{member}", self.keys.queue()));
            }
            let mut conn = self.conn.clone();
            let exists: Vec<bool> = pipe.query_async(&mut conn).await.map_err(unavailable)?;

            let gone: Vec<&String> = members
                .iter()
                .zip(exists)
                .filter_map(|(member, exists)| (!exists).then_some(member))
                .collect();
            if gone.is_empty() {
                continue;
            }

            let n: usize = conn
                .srem(self.keys.status(status), gone)
                .await
                .map_err(unavailable)?;
            removed += n;
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
