//! IdGenerator port.
//!
//! API processes mint job IDs without talking to each other, so IDs are
//! ULIDs: timestamp from the injected `Clock`, random tail from `rand`.

use std::sync::Arc;

use ulid::Ulid;

use crate::domain::JobId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;
}

pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl IdGenerator for UlidGenerator {
    fn generate_job_id(&self) -> JobId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        JobId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let ids = UlidGenerator::new(Arc::new(SystemClock));

        let id1 = ids.generate_job_id();
        let id2 = ids.generate_job_id();

        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("job-"));
    }

    #[test]
    fn timestamp_part_comes_from_clock() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ids = UlidGenerator::new(Arc::new(FixedClock::new(fixed_time)));

        let id1 = ids.generate_job_id();
        let id2 = ids.generate_job_id();

        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
