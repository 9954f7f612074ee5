use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::ids::JobId;

const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per job. Everything that touches a job's status, bids or
/// booking runs while holding that job's guard; different jobs never wait
/// on each other.
#[derive(Default)]
pub struct JobLocks {
    locks: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, job_id: &JobId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                // Only this map holds idle entries.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(job_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
