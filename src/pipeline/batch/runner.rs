use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::{BatchError, BatchItemResult, JobTracker};
use crate::db::HitlStore;
use crate::models::AuditAction;
use crate::pipeline::loader::{is_allowed_file, DocumentLoader};
use crate::pipeline::orchestrator::ClassificationPipeline;

pub const INVALID_FILE_TYPE: &str = "Invalid file type";

/// Classifies a list of files into one tracked job.
#[derive(Clone)]
pub struct BatchRunner {
    pipeline: Arc<ClassificationPipeline>,
    store: Arc<HitlStore>,
    loader: Arc<dyn DocumentLoader>,
    tracker: Arc<JobTracker>,
}

impl BatchRunner {
    pub fn new(
        pipeline: Arc<ClassificationPipeline>,
        store: Arc<HitlStore>,
        loader: Arc<dyn DocumentLoader>,
        tracker: Arc<JobTracker>,
    ) -> Self {
        Self {
            pipeline,
            store,
            loader,
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Create a job and process it in the background. Returns the job id at once.
    pub fn start(&self, files: Vec<PathBuf>) -> Result<Uuid, BatchError> {
        let id = self.tracker.create(files.len())?;
        let runner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.run(id, files).await {
                tracing::error!(job_id = %id, error = %e, "Batch job aborted");
            }
        });
        Ok(id)
    }

    /// Process `files` in order under an existing job, then complete it.
    ///
    /// A tracker failure stops the run, but the job is still completed so
    /// pollers see it finish.
    pub async fn run(&self, job_id: Uuid, files: Vec<PathBuf>) -> Result<(), BatchError> {
        let processed = self.process(job_id, &files).await;
        let completed = self.tracker.complete(job_id);
        if let Err(e) = &processed {
            tracing::error!(job_id = %job_id, error = %e, "Batch job stopped early");
        }
        processed.and(completed)
    }

    async fn process(&self, job_id: Uuid, files: &[PathBuf]) -> Result<(), BatchError> {
        for path in files {
            let mut context = Map::new();
            context.insert("job_id".to_string(), Value::String(job_id.to_string()));
            let item = self
                .classify_file(path, AuditAction::BatchClassification, context)
                .await;
            if item.is_error() {
                tracing::warn!(job_id = %job_id, filename = %item.filename, "Batch item failed");
            }
            self.tracker.record(job_id, item)?;
        }
        Ok(())
    }

    /// Load, classify and audit one file. Failures become an error entry.
    pub async fn classify_file(
        &self,
        path: &Path,
        action: AuditAction,
        context: Map<String, Value>,
    ) -> BatchItemResult {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        if !is_allowed_file(path) {
            return BatchItemResult::failed(&filename, INVALID_FILE_TYPE);
        }

        let doc = match self.loader.load(path) {
            Ok(doc) => doc,
            Err(e) => return BatchItemResult::failed(&filename, e.to_string()),
        };

        match self
            .pipeline
            .classify_and_audit(&self.store, &filename, &doc, action, context)
            .await
        {
            Ok(outcome) => BatchItemResult::classified(&filename, outcome),
            Err(e) => BatchItemResult::failed(&filename, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::models::{Classification, JobStatus};
    use crate::pipeline::batch::BatchItemOutcome;
    use crate::pipeline::loader::FileLoader;
    use crate::pipeline::oracle::MockOracle;

    fn runner(store: Arc<HitlStore>) -> BatchRunner {
        let oracle = Arc::new(MockOracle::new(
            r#"{"classification": "Public", "confidence": 0.96}"#,
        ));
        BatchRunner::new(
            Arc::new(ClassificationPipeline::new(oracle, Duration::from_secs(5))),
            store,
            Arc::new(FileLoader::default()),
            Arc::new(JobTracker::new()),
        )
    }

    #[tokio::test]
    async fn records_per_file_errors_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("flyer.txt");
        std::fs::write(&good, "Spring sale brochure with special offer details. ".repeat(10)).unwrap();
        let bad = dir.path().join("tool.exe");
        std::fs::write(&bad, b"MZ").unwrap();
        let missing = dir.path().join("missing.txt");

        let store = Arc::new(HitlStore::in_memory().unwrap());
        let runner = runner(store.clone());
        let id = runner.tracker().create(3).unwrap();
        runner.run(id, vec![good, bad, missing]).await.unwrap();

        let job = runner.tracker().snapshot(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed, 3);
        assert_eq!(job.results[0].filename, "flyer.txt");
        match &job.results[0].outcome {
            BatchItemOutcome::Result(outcome) => {
                assert_eq!(outcome.result.classification, Classification::Public);
                assert!(outcome.audit_id.is_some());
            }
            BatchItemOutcome::Error(e) => panic!("unexpected error {e}"),
        }
        assert_eq!(
            job.results[1].outcome,
            BatchItemOutcome::Error("Invalid file type".into())
        );
        assert!(job.results[2].is_error());

        let trail = store.audit_trail(10, true).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::BatchClassification);
        assert_eq!(trail[0].details["job_id"], id.to_string());
    }

    #[tokio::test]
    async fn tracker_failure_still_completes_job() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = ["a.exe", "b.exe"].iter().map(|f| dir.path().join(f)).collect();

        let runner = runner(Arc::new(HitlStore::in_memory().unwrap()));
        let id = runner.tracker().create(1).unwrap();
        let err = runner.run(id, files).await.unwrap_err();
        assert_eq!(err, BatchError::JobFull { id, total: 1 });

        let job = runner.tracker().snapshot(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert_eq!(job.completed, 1);
    }

    #[tokio::test]
    async fn start_runs_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("note.md");
        std::fs::write(&file, "Team lunch is on Friday at noon in the main hall. ".repeat(10)).unwrap();

        let runner = runner(Arc::new(HitlStore::in_memory().unwrap()));
        let id = runner.start(vec![file]).unwrap();

        let mut job = runner.tracker().snapshot(id).unwrap().unwrap();
        for _ in 0..100 {
            if job.status == JobStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            job = runner.tracker().snapshot(id).unwrap().unwrap();
        }
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total, 1);
        assert_eq!(job.completed, 1);
    }
}
