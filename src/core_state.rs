//! Shared application state.
//!
//! `CoreState` owns the HITL store and everything built on it, so a front end
//! (the CLI today) only deals with one handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ClassifierConfig;
use crate::db::{DatabaseError, HitlStore};
use crate::feedback::FeedbackRecorder;
use crate::models::AuditAction;
use crate::pipeline::batch::{BatchError, BatchItemResult, BatchJob, BatchRunner, JobTracker};
use crate::pipeline::loader::{DocumentLoader, FileLoader};
use crate::pipeline::oracle::OracleError;
use crate::pipeline::orchestrator::ClassificationPipeline;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

pub struct CoreState {
    config: ClassifierConfig,
    store: Arc<HitlStore>,
    recorder: FeedbackRecorder,
    runner: BatchRunner,
}

impl CoreState {
    /// Open the configured database and build the Ollama-backed pipeline.
    pub fn open(config: ClassifierConfig) -> Result<Self, CoreError> {
        let store = Arc::new(HitlStore::open(&config.database_path)?);
        let pipeline = ClassificationPipeline::from_config(&config, store.clone())?;
        tracing::info!(
            db = %config.database_path.display(),
            primary = %config.primary_model,
            secondary = %config.secondary_model(),
            dual_verification = config.enable_dual_verification,
            "Core state ready"
        );
        Ok(Self::with_components(
            config,
            store,
            pipeline,
            Arc::new(FileLoader::default()),
        ))
    }

    pub fn with_components(
        config: ClassifierConfig,
        store: Arc<HitlStore>,
        pipeline: ClassificationPipeline,
        loader: Arc<dyn DocumentLoader>,
    ) -> Self {
        let runner = BatchRunner::new(
            Arc::new(pipeline),
            store.clone(),
            loader,
            Arc::new(JobTracker::new()),
        );
        Self {
            config,
            recorder: FeedbackRecorder::new(store.clone()),
            store,
            runner,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn store(&self) -> &HitlStore {
        &self.store
    }

    pub fn recorder(&self) -> &FeedbackRecorder {
        &self.recorder
    }

    pub fn jobs(&self) -> &JobTracker {
        self.runner.tracker()
    }

    /// Classify one file interactively and audit it.
    pub async fn classify_file(&self, path: &Path) -> BatchItemResult {
        self.runner
            .classify_file(path, AuditAction::Classification, Map::new())
            .await
    }

    /// Classify a file again, audited as a re-classification. `previous` links
    /// the new audit row to the entry it supersedes.
    pub async fn reclassify(&self, path: &Path, previous: Option<i64>) -> BatchItemResult {
        let mut context = Map::new();
        if let Some(id) = previous {
            context.insert("previous_document_id".into(), Value::from(id));
        }
        tracing::info!(path = %path.display(), previous = ?previous, "Re-classifying file");
        self.runner
            .classify_file(path, AuditAction::Reclassification, context)
            .await
    }

    /// Run a batch to completion and return its final state.
    pub async fn run_batch(&self, files: Vec<PathBuf>) -> Result<BatchJob, CoreError> {
        let id = self.jobs().create(files.len())?;
        self.runner.run(id, files).await?;
        self.job(id)
    }

    pub fn job(&self, id: Uuid) -> Result<BatchJob, CoreError> {
        self.jobs()
            .snapshot(id)?
            .ok_or(CoreError::Batch(BatchError::JobNotFound(id)))
    }
}
