use std::sync::Arc;
use std::time::Duration;

use super::parser::{
    classification_from_value, heuristic_classification, recover_json, safety_from_value,
    secondary_from_value, RecoveryStage,
};
use super::{ClassifierOracle, ContentBlock, OracleError};
use crate::models::{ClassificationResult, DocumentContent, SafetyAssessment, SecondaryOpinion};

/// Normalized result of one oracle call.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutcome<T> {
    /// JSON was recovered and coerced.
    Structured { value: T, stage: RecoveryStage },
    /// No JSON; the value came from the keyword heuristic over `raw_text`.
    Heuristic { value: T, raw_text: String },
    Failed(OracleError),
}

impl<T> OracleOutcome<T> {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Structured { value, .. } | Self::Heuristic { value, .. } => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<T, OracleError> {
        match self {
            Self::Structured { value, .. } | Self::Heuristic { value, .. } => Ok(value),
            Self::Failed(e) => Err(e),
        }
    }
}

impl OracleOutcome<ClassificationResult> {
    /// Collapse to a result, mapping failure to the synthetic Error classification.
    pub fn into_classification(self) -> ClassificationResult {
        match self.into_result() {
            Ok(result) => result,
            Err(e) => ClassificationResult::oracle_error(&e.user_message()),
        }
    }
}

// ── Content blocks ──────────────────────────────────────────

/// Primary classification input: each page as a "[Page N]" text block
/// followed by its rendered image.
pub fn primary_content(doc: &DocumentContent) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    for page in &doc.pages {
        if !page.text.trim().is_empty() {
            blocks.push(ContentBlock::Text(format!(
                "[Page {}]\n{}",
                page.page_number, page.text
            )));
        }
        if let Some(image) = &page.image {
            blocks.push(ContentBlock::Image {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            });
        }
    }
    blocks
}

/// Safety and verification input: bare page text and images.
pub fn plain_content(doc: &DocumentContent) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    for page in &doc.pages {
        if !page.text.trim().is_empty() {
            blocks.push(ContentBlock::Text(page.text.clone()));
        }
        if let Some(image) = &page.image {
            blocks.push(ContentBlock::Image {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            });
        }
    }
    blocks
}

// ── Adapter ─────────────────────────────────────────────────

/// Runs a blocking oracle on the blocking pool with a per-call timeout.
#[derive(Clone)]
pub struct OracleAdapter {
    oracle: Arc<dyn ClassifierOracle>,
    timeout: Duration,
}

impl OracleAdapter {
    pub fn new(oracle: Arc<dyn ClassifierOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    pub fn model(&self) -> &str {
        self.oracle.model()
    }

    /// Raw oracle text, or the transport/timeout failure.
    pub async fn invoke(
        &self,
        prompt: String,
        content: Arc<Vec<ContentBlock>>,
    ) -> Result<String, OracleError> {
        let oracle = Arc::clone(&self.oracle);
        let call = tokio::task::spawn_blocking(move || oracle.invoke(&prompt, &content));

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(OracleError::Other(format!("Oracle task failed: {join_err}"))),
            Err(_) => {
                tracing::warn!(
                    model = %self.oracle.model(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Oracle call timed out"
                );
                Err(OracleError::Timeout(self.timeout))
            }
        }
    }

    /// Primary classification: recovery chain, then keyword heuristic.
    pub async fn classify(
        &self,
        prompt: String,
        content: Arc<Vec<ContentBlock>>,
    ) -> OracleOutcome<ClassificationResult> {
        let raw = match self.invoke(prompt, content).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(model = %self.model(), error = %e, "Primary classification failed");
                return OracleOutcome::Failed(e);
            }
        };

        match recover_json(&raw) {
            Ok(recovered) => OracleOutcome::Structured {
                value: classification_from_value(&recovered.value),
                stage: recovered.stage,
            },
            Err(_) => {
                tracing::warn!(
                    model = %self.model(),
                    response_len = raw.len(),
                    "No JSON in classification response, using keyword heuristic"
                );
                OracleOutcome::Heuristic {
                    value: heuristic_classification(&raw),
                    raw_text: raw,
                }
            }
        }
    }

    pub async fn safety(
        &self,
        prompt: String,
        content: Arc<Vec<ContentBlock>>,
    ) -> OracleOutcome<SafetyAssessment> {
        let raw = match self.invoke(prompt, content).await {
            Ok(raw) => raw,
            Err(e) => return OracleOutcome::Failed(e),
        };
        match recover_json(&raw) {
            Ok(recovered) => OracleOutcome::Structured {
                value: safety_from_value(&recovered.value),
                stage: recovered.stage,
            },
            Err(e) => OracleOutcome::Failed(OracleError::MalformedResponse(e.to_string())),
        }
    }

    pub async fn verify(
        &self,
        prompt: String,
        content: Arc<Vec<ContentBlock>>,
    ) -> OracleOutcome<SecondaryOpinion> {
        let raw = match self.invoke(prompt, content).await {
            Ok(raw) => raw,
            Err(e) => return OracleOutcome::Failed(e),
        };
        match recover_json(&raw) {
            Ok(recovered) => OracleOutcome::Structured {
                value: secondary_from_value(&recovered.value),
                stage: recovered.stage,
            },
            Err(e) => OracleOutcome::Failed(OracleError::MalformedResponse(e.to_string())),
        }
    }
}
