// src/ingest/jobs.rs
//! Bounded in-memory log of ingest runs, newest last.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestJob {
    pub id: u64,
    pub source: String,
    pub status: JobStatus,
    pub articles_found: usize,
    pub articles_created: usize,
    pub articles_updated: usize,
    pub embeddings_written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestJob {
    fn pending(id: u64, source: &str) -> Self {
        Self {
            id,
            source: source.to_string(),
            status: JobStatus::Pending,
            articles_found: 0,
            articles_created: 0,
            articles_updated: 0,
            embeddings_written: 0,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct Jobs {
    last_id: u64,
    entries: Vec<IngestJob>,
}

#[derive(Debug)]
pub struct JobHistory {
    inner: Mutex<Jobs>,
    cap: usize,
}

impl JobHistory {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Jobs::default()),
            cap: cap.clamp(1, 10_000),
        }
    }

    // A panicked writer leaves at worst a stale status behind; keep serving.
    fn lock(&self) -> MutexGuard<'_, Jobs> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register a new pending job for `source`.
    pub fn create(&self, source: &str) -> IngestJob {
        let mut g = self.lock();
        g.last_id += 1;
        let job = IngestJob::pending(g.last_id, source);
        g.entries.push(job.clone());
        if g.entries.len() > self.cap {
            let excess = g.entries.len() - self.cap;
            g.entries.drain(0..excess);
        }
        job
    }

    /// Store the current state of `job`. No-op once it has been evicted.
    pub fn record(&self, job: &IngestJob) {
        let mut g = self.lock();
        if let Some(slot) = g.entries.iter_mut().find(|j| j.id == job.id) {
            *slot = job.clone();
        }
    }

    pub fn get(&self, id: u64) -> Option<IngestJob> {
        self.lock().entries.iter().find(|j| j.id == id).cloned()
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<IngestJob> {
        let g = self.lock();
        let start = g.entries.len().saturating_sub(n);
        g.entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobHistory {
    fn default() -> Self {
        Self::with_capacity(200)
    }
}
