//! Classification pipeline:
//! legibility gate → scan → template → enhance → (safety ∥ primary) → verify → reconcile

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::Instrument;

use super::enhancer::PromptEnhancer;
use super::oracle::{
    plain_content, primary_content, ClassifierOracle, OllamaOracle, OracleAdapter, OracleError,
    OracleOutcome,
};
use super::prompt_templates::{
    safety_check_prompt, select_template, verification_prompt, PromptTemplateId,
};
use super::reconcile::{reconcile, secondary_unavailable, ReconciliationOutcome};
use super::scan::scan_document;
use crate::config::{ClassifierConfig, SECONDARY_CONFIDENCE_THRESHOLD};
use crate::db::{DatabaseError, HitlStore};
use crate::models::{
    AuditAction, ClassificationResult, DocumentContent, NewAuditEntry, OutcomeStatus, PreCheck,
    SafetyAssessment, SecondaryOpinion,
};

pub const ILLEGIBLE_MESSAGE: &str = "Document is not legible";

/// Everything the pipeline knows about one classified document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    pub status: OutcomeStatus,
    pub message: String,
    pub pre_check: PreCheck,
    /// `None` when the document never reached template selection.
    pub template: Option<PromptTemplateId>,
    pub result: ClassificationResult,
    pub safety: Option<SafetyAssessment>,
    pub dual_verification_used: bool,
    pub reconciliation: ReconciliationOutcome,
    pub secondary_opinion: Option<SecondaryOpinion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<i64>,
}

impl ClassificationOutcome {
    fn illegible(pre_check: PreCheck) -> Self {
        Self {
            status: OutcomeStatus::Error,
            message: ILLEGIBLE_MESSAGE.to_string(),
            pre_check,
            template: None,
            result: ClassificationResult::rejected(ILLEGIBLE_MESSAGE),
            safety: None,
            dual_verification_used: false,
            reconciliation: ReconciliationOutcome::NotRun,
            secondary_opinion: None,
            audit_id: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

pub struct ClassificationPipeline {
    primary: OracleAdapter,
    secondary: Option<OracleAdapter>,
    enhancer: Option<PromptEnhancer>,
    enable_dual_verification: bool,
    timeout: Duration,
}

impl ClassificationPipeline {
    pub fn new(primary: Arc<dyn ClassifierOracle>, timeout: Duration) -> Self {
        Self {
            primary: OracleAdapter::new(primary, timeout),
            secondary: None,
            enhancer: None,
            enable_dual_verification: true,
            timeout,
        }
    }

    pub fn with_secondary(mut self, oracle: Arc<dyn ClassifierOracle>) -> Self {
        self.secondary = Some(OracleAdapter::new(oracle, self.timeout));
        self
    }

    pub fn with_enhancer(mut self, enhancer: PromptEnhancer) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    pub fn with_dual_verification(mut self, enabled: bool) -> Self {
        self.enable_dual_verification = enabled;
        self
    }

    /// Ollama-backed pipeline with prompt enhancement from `store`.
    pub fn from_config(config: &ClassifierConfig, store: Arc<HitlStore>) -> Result<Self, OracleError> {
        let primary = Arc::new(OllamaOracle::primary(config)?);
        let mut pipeline = Self::new(primary, config.oracle_timeout)
            .with_enhancer(PromptEnhancer::new(store))
            .with_dual_verification(config.enable_dual_verification);
        if config.enable_dual_verification {
            pipeline = pipeline.with_secondary(Arc::new(OllamaOracle::secondary(config)?));
        }
        Ok(pipeline)
    }

    pub async fn classify(&self, doc: &DocumentContent) -> ClassificationOutcome {
        let span = tracing::info_span!(
            "classify_document",
            pages = doc.total_pages,
            images = doc.total_images
        );
        self.run(doc).instrument(span).await
    }

    async fn run(&self, doc: &DocumentContent) -> ClassificationOutcome {
        let pre_check = doc.pre_check();
        if !doc.is_legible {
            tracing::warn!(pages = doc.total_pages, "Document failed legibility check");
            return ClassificationOutcome::illegible(pre_check);
        }

        let scan = scan_document(doc);
        let template = select_template(&scan);
        let prompt = match &self.enhancer {
            Some(enhancer) => enhancer.enhance_blocking(template).await,
            None => template.text(),
        };

        let primary_blocks = Arc::new(primary_content(doc));
        let plain_blocks = Arc::new(plain_content(doc));

        let (safety, primary) = tokio::join!(
            self.primary
                .safety(safety_check_prompt().to_string(), Arc::clone(&plain_blocks)),
            self.primary.classify(prompt, primary_blocks),
        );

        let safety = match safety.into_result() {
            Ok(assessment) => assessment,
            Err(e) => {
                tracing::warn!(error = %e, "Safety check failed, assuming safe");
                SafetyAssessment::fail_open()
            }
        };

        let primary_result = match primary {
            OracleOutcome::Failed(e) => {
                let result = ClassificationResult::oracle_error(&e.user_message());
                return ClassificationOutcome {
                    status: OutcomeStatus::Error,
                    message: e.user_message(),
                    pre_check,
                    template: Some(template),
                    result,
                    safety: Some(safety),
                    dual_verification_used: false,
                    reconciliation: ReconciliationOutcome::NotRun,
                    secondary_opinion: None,
                    audit_id: None,
                };
            }
            outcome => outcome.into_classification(),
        };

        let secondary = self
            .secondary
            .as_ref()
            .filter(|_| self.enable_dual_verification)
            .filter(|_| primary_result.confidence < SECONDARY_CONFIDENCE_THRESHOLD);

        let (reconciled, dual_verification_used) = match secondary {
            Some(verifier) => {
                tracing::info!(
                    confidence = primary_result.confidence,
                    model = %verifier.model(),
                    "Running secondary verification"
                );
                let outcome = verifier
                    .verify(verification_prompt(&primary_result), plain_blocks)
                    .await;
                let reconciled = match outcome.into_result() {
                    Ok(opinion) => reconcile(primary_result, Some(opinion)),
                    Err(e) => secondary_unavailable(primary_result, &e),
                };
                (reconciled, true)
            }
            None => (reconcile(primary_result, None), false),
        };

        tracing::info!(
            classification = %reconciled.result.classification,
            confidence = reconciled.result.confidence,
            template = %template,
            requires_review = reconciled.result.requires_human_review,
            "Document classified"
        );

        ClassificationOutcome {
            status: OutcomeStatus::Success,
            message: "Classification completed".to_string(),
            pre_check,
            template: Some(template),
            result: reconciled.result,
            safety: Some(safety),
            dual_verification_used,
            reconciliation: reconciled.outcome,
            secondary_opinion: reconciled.secondary,
            audit_id: None,
        }
    }

    /// Classify and append the outcome to the audit trail.
    ///
    /// `context` keys are merged into the stored details alongside the outcome.
    pub async fn classify_and_audit(
        &self,
        store: &HitlStore,
        filename: &str,
        doc: &DocumentContent,
        action: AuditAction,
        context: Map<String, Value>,
    ) -> Result<ClassificationOutcome, DatabaseError> {
        let mut outcome = self.classify(doc).await;

        let mut details = match serde_json::to_value(&outcome)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        details.extend(context);

        let entry = NewAuditEntry::system(
            filename,
            outcome.result.classification,
            Some(outcome.result.confidence),
            action,
            Value::Object(details),
        );
        let id = store.save_audit_log(&entry)?;
        tracing::debug!(audit_id = id, filename, "Audit entry written");

        outcome.audit_id = Some(id);
        Ok(outcome)
    }
}
