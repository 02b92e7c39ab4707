//! Classification, safety and verification results produced by the pipeline.
//!
//! Every degraded path (oracle failure, unparseable output, illegible input)
//! still yields a fully populated `ClassificationResult`, so consumers never
//! special-case a failed shape.

use serde::{Deserialize, Serialize};

use super::enums::{Classification, Recommendation};

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_PRIMARY_REASON: &str = "Classification completed";
pub const DEFAULT_DETAILED_REASONING: &str = "Document analyzed";

/// Clamp to [0, 1]. NaN falls back to the default confidence.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        DEFAULT_CONFIDENCE
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// One piece of evidence cited by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub page: u32,
    pub location: String,
    pub finding: String,
    pub category_trigger: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiDetected {
    pub ssn: bool,
    pub credit_card: bool,
    pub account_numbers: bool,
    pub names: bool,
    pub addresses: bool,
    pub other: Vec<String>,
}

impl PiiDetected {
    pub fn any(&self) -> bool {
        self.ssn
            || self.credit_card
            || self.account_numbers
            || self.names
            || self.addresses
            || !self.other.is_empty()
    }
}

/// Normalized sensitivity classification for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub classification: Classification,
    pub confidence: f64,
    pub primary_reason: String,
    pub detailed_reasoning: String,
    pub evidence: Vec<Evidence>,
    pub pii_detected: PiiDetected,
    pub recommendations: Vec<String>,
    pub requires_human_review: bool,
    pub review_reason: String,
}

impl Default for ClassificationResult {
    /// The fill-defaults object used for any field the oracle omitted.
    fn default() -> Self {
        Self {
            classification: Classification::Unknown,
            confidence: DEFAULT_CONFIDENCE,
            primary_reason: DEFAULT_PRIMARY_REASON.to_string(),
            detailed_reasoning: DEFAULT_DETAILED_REASONING.to_string(),
            evidence: Vec::new(),
            pii_detected: PiiDetected::default(),
            recommendations: Vec::new(),
            requires_human_review: false,
            review_reason: String::new(),
        }
    }
}

impl ClassificationResult {
    /// Synthetic result for a transport, quota or policy failure.
    pub fn oracle_error(message: &str) -> Self {
        Self {
            classification: Classification::Error,
            confidence: 0.0,
            primary_reason: "API Error".to_string(),
            detailed_reasoning: format!("Classification failed due to error: {message}"),
            recommendations: vec![
                "Retry classification".to_string(),
                "Check API configuration".to_string(),
            ],
            requires_human_review: true,
            review_reason: format!("API Error: {message}"),
            ..Self::default()
        }
    }

    /// Placeholder result for documents that never reached the oracle.
    pub fn rejected(reason: &str) -> Self {
        Self {
            classification: Classification::Error,
            confidence: 0.0,
            primary_reason: reason.to_string(),
            detailed_reasoning: format!("Classification not attempted: {reason}"),
            requires_human_review: true,
            review_reason: reason.to_string(),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.classification == Classification::Error
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub violation_type: String,
    pub severity: String,
    pub location: String,
    pub description: String,
}

/// Content-safety verdict, assessed independently of sensitivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub is_safe: bool,
    pub child_safe: bool,
    pub violations: Vec<Violation>,
    pub confidence: f64,
    pub requires_immediate_review: bool,
}

impl SafetyAssessment {
    /// Confidence assumed when the oracle answered but omitted it.
    pub const REPORTED_DEFAULT_CONFIDENCE: f64 = 0.95;

    /// Fail-open verdict used when the safety check could not complete.
    pub fn fail_open() -> Self {
        Self {
            is_safe: true,
            child_safe: true,
            violations: Vec::new(),
            confidence: DEFAULT_CONFIDENCE,
            requires_immediate_review: false,
        }
    }
}

/// Verdict of the verification oracle on a primary classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryOpinion {
    pub agreement: bool,
    pub your_classification: Classification,
    pub confidence: f64,
    pub discrepancies: Vec<String>,
    pub additional_evidence: Vec<Evidence>,
    pub recommendation: Recommendation,
    pub reasoning: String,
}
