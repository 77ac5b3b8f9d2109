// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Capacity-bounded, TTL-aware request store (C2).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::model::{Job, JobPatch};

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Storage contract for job requests.
///
/// The `memory` implementation below is the only backend this service
/// ships; future backends (a shared cache, etc.) plug in behind this same
/// trait. Implementations must keep individual operations linearizable;
/// broader transactional guarantees across operations are not required.
pub trait RequestStore: Send + Sync {
    /// Inserts a new job. Returns `false` without mutating the store if
    /// doing so would exceed the configured capacity.
    fn add(&self, job_id: &str, job: Job) -> bool;

    /// Looks up a job by id, lazily evicting it first if it has expired.
    fn get(&self, job_id: &str) -> Option<Job>;

    /// Applies a partial patch atomically. `created_at` is preserved.
    /// Returns `false` if `job_id` is unknown.
    fn update(&self, job_id: &str, patch: JobPatch) -> bool;

    /// Removes a job unconditionally. Returns `false` if it was not present.
    fn delete(&self, job_id: &str) -> bool;

    /// Snapshot of all jobs currently in the store (expired entries may
    /// still be present until the next sweep or lazy eviction).
    fn list(&self) -> HashMap<String, Job>;

    /// Removes every entry older than the configured TTL. A no-op when no
    /// TTL is configured.
    fn sweep_expired(&self);
}

struct Entry {
    job: Job,
    created_at: DateTime<Utc>,
}

/// In-memory `RequestStore`, guarded by a single mutex over the whole map.
/// `RUNNING_INDEX_BUILD` entries are not protected from TTL eviction: the
/// TTL is a ceiling on result availability, not a workflow lifeline.
pub struct InMemoryRequestStore {
    entries: Mutex<HashMap<String, Entry>>,
    max_size: usize,
    ttl_seconds: Option<i64>,
}

impl InMemoryRequestStore {
    pub fn new(max_size: usize, ttl_seconds: Option<i64>) -> Self {
        InMemoryRequestStore {
            entries: Mutex::new(HashMap::new()),
            max_size,
            ttl_seconds,
        }
    }

    fn is_expired(&self, created_at: &DateTime<Utc>) -> bool {
        match self.ttl_seconds {
            None => false,
            Some(ttl) => Utc::now().signed_duration_since(*created_at).num_seconds() >= ttl,
        }
    }

    /// Spawns the background sweeper as a detached task. It runs for the
    /// lifetime of the process; there is nothing to join on shutdown.
    pub fn spawn_sweeper(store: std::sync::Arc<InMemoryRequestStore>) {
        if store.ttl_seconds.is_none() {
            return;
        }
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                store.sweep_expired();
            }
        });
    }
}

impl RequestStore for InMemoryRequestStore {
    fn add(&self, job_id: &str, job: Job) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.max_size {
            return false;
        }
        entries.insert(
            job_id.to_string(),
            Entry {
                created_at: job.created_at,
                job,
            },
        );
        true
    }

    fn get(&self, job_id: &str) -> Option<Job> {
        let mut entries = self.entries.lock().unwrap();
        let expired = entries.get(job_id).map(|e| self.is_expired(&e.created_at));
        match expired {
            None => None,
            Some(true) => {
                entries.remove(job_id);
                None
            }
            Some(false) => entries.get(job_id).map(|e| e.job.clone()),
        }
    }

    fn update(&self, job_id: &str, patch: JobPatch) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(job_id) else {
            return false;
        };
        if let Some(status) = patch.status {
            entry.job.status = status;
        }
        if patch.file_name.is_some() {
            entry.job.file_name = patch.file_name;
        }
        if patch.error_message.is_some() {
            entry.job.error_message = patch.error_message;
        }
        true
    }

    fn delete(&self, job_id: &str) -> bool {
        self.entries.lock().unwrap().remove(job_id).is_some()
    }

    fn list(&self) -> HashMap<String, Job> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.job.clone()))
            .collect()
    }

    fn sweep_expired(&self) {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(&entry.created_at));
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, "swept expired request store entries");
        }
    }
}
