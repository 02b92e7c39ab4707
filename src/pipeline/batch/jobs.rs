use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::BatchError;
use crate::db::repository::now_timestamp;
use crate::models::JobStatus;
use crate::pipeline::orchestrator::ClassificationOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemOutcome {
    Result(Box<ClassificationOutcome>),
    Error(String),
}

/// Per-file entry: `{filename, result}` or `{filename, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub filename: String,
    #[serde(flatten)]
    pub outcome: BatchItemOutcome,
}

impl BatchItemResult {
    pub fn classified(filename: &str, outcome: ClassificationOutcome) -> Self {
        Self {
            filename: filename.to_string(),
            outcome: BatchItemOutcome::Result(Box::new(outcome)),
        }
    }

    pub fn failed(filename: &str, error: impl Into<String>) -> Self {
        Self {
            filename: filename.to_string(),
            outcome: BatchItemOutcome::Error(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, BatchItemOutcome::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub total: usize,
    pub completed: usize,
    pub results: Vec<BatchItemResult>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

/// In-memory registry of batch jobs. Lost on restart.
#[derive(Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<Uuid, BatchJob>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, total: usize) -> Result<Uuid, BatchError> {
        let id = Uuid::new_v4();
        let job = BatchJob {
            id,
            status: JobStatus::Processing,
            total,
            completed: 0,
            results: Vec::with_capacity(total),
            started_at: now_timestamp(),
            completed_at: None,
        };
        self.jobs
            .write()
            .map_err(|_| BatchError::LockPoisoned)?
            .insert(id, job);
        tracing::info!(job_id = %id, total, "Batch job created");
        Ok(id)
    }

    /// Append a result and advance `completed` in one step. `completed` never
    /// exceeds `total`.
    pub fn record(&self, id: Uuid, item: BatchItemResult) -> Result<(), BatchError> {
        let mut jobs = self.jobs.write().map_err(|_| BatchError::LockPoisoned)?;
        let job = jobs.get_mut(&id).ok_or(BatchError::JobNotFound(id))?;
        if job.status == JobStatus::Completed {
            return Err(BatchError::AlreadyCompleted(id));
        }
        if job.completed >= job.total {
            return Err(BatchError::JobFull { id, total: job.total });
        }
        job.results.push(item);
        job.completed += 1;
        Ok(())
    }

    /// Mark the job completed. Completing twice keeps the first timestamp.
    pub fn complete(&self, id: Uuid) -> Result<(), BatchError> {
        let mut jobs = self.jobs.write().map_err(|_| BatchError::LockPoisoned)?;
        let job = jobs.get_mut(&id).ok_or(BatchError::JobNotFound(id))?;
        if job.status != JobStatus::Completed {
            job.status = JobStatus::Completed;
            job.completed_at = Some(now_timestamp());
            tracing::info!(job_id = %id, completed = job.completed, total = job.total, "Batch job completed");
        }
        Ok(())
    }

    /// Point-in-time copy of a job.
    pub fn snapshot(&self, id: Uuid) -> Result<Option<BatchJob>, BatchError> {
        let jobs = self.jobs.read().map_err(|_| BatchError::LockPoisoned)?;
        Ok(jobs.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let tracker = JobTracker::new();
        let id = tracker.create(2).unwrap();

        let job = tracker.snapshot(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.completed, 0);
        assert!(job.completed_at.is_none());

        tracker.record(id, BatchItemResult::failed("a.exe", "Invalid file type")).unwrap();
        tracker.record(id, BatchItemResult::failed("b.exe", "Invalid file type")).unwrap();
        tracker.complete(id).unwrap();

        let job = tracker.snapshot(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed, 2);
        assert_eq!(job.results.len(), 2);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn completed_is_terminal() {
        let tracker = JobTracker::new();
        let id = tracker.create(1).unwrap();
        tracker.complete(id).unwrap();
        let first = tracker.snapshot(id).unwrap().unwrap().completed_at;

        assert_eq!(
            tracker.record(id, BatchItemResult::failed("late.txt", "x")),
            Err(BatchError::AlreadyCompleted(id))
        );
        tracker.complete(id).unwrap();
        assert_eq!(tracker.snapshot(id).unwrap().unwrap().completed_at, first);
    }

    #[test]
    fn record_past_total_is_rejected() {
        let tracker = JobTracker::new();
        let id = tracker.create(1).unwrap();
        tracker.record(id, BatchItemResult::failed("a.txt", "x")).unwrap();
        assert_eq!(
            tracker.record(id, BatchItemResult::failed("b.txt", "x")),
            Err(BatchError::JobFull { id, total: 1 })
        );
        assert_eq!(tracker.snapshot(id).unwrap().unwrap().completed, 1);
    }

    #[test]
    fn snapshot_is_isolated() {
        let tracker = JobTracker::new();
        let id = tracker.create(3).unwrap();
        let before = tracker.snapshot(id).unwrap().unwrap();

        tracker.record(id, BatchItemResult::failed("x.txt", "boom")).unwrap();

        assert_eq!(before.completed, 0);
        assert!(before.results.is_empty());
        assert_eq!(tracker.snapshot(id).unwrap().unwrap().completed, 1);
    }

    #[test]
    fn unknown_job() {
        let tracker = JobTracker::new();
        let id = Uuid::new_v4();
        assert_eq!(tracker.snapshot(id).unwrap(), None);
        assert_eq!(
            tracker.record(id, BatchItemResult::failed("x", "y")),
            Err(BatchError::JobNotFound(id))
        );
    }

    #[test]
    fn item_serializes_flat() {
        let item = BatchItemResult::failed("a.exe", "Invalid file type");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json, serde_json::json!({"filename": "a.exe", "error": "Invalid file type"}));
    }

    #[test]
    fn concurrent_records_all_counted() {
        let tracker = std::sync::Arc::new(JobTracker::new());
        let id = tracker.create(16).unwrap();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    tracker
                        .record(id, BatchItemResult::failed(&format!("f{i}"), "e"))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let job = tracker.snapshot(id).unwrap().unwrap();
        assert_eq!(job.completed, 16);
        assert_eq!(job.results.len(), 16);
    }
}
