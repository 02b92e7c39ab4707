use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::enums::{AuditAction, Classification};

/// Stored context samples are cut to this many characters.
pub const CONTEXT_SAMPLE_MAX_CHARS: usize = 200;

/// Reviewer verdict on one audited classification, as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSubmission {
    pub document_id: i64,
    pub original_classification: Classification,
    pub corrected_classification: Classification,
    pub reviewer_name: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub confidence_at_review: Option<f64>,
    #[serde(default)]
    pub evidence: serde_json::Value,
}

impl FeedbackSubmission {
    pub fn is_agreement(&self) -> bool {
        self.original_classification == self.corrected_classification
    }
}

/// A persisted feedback row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: i64,
    pub document_id: i64,
    pub original_classification: Classification,
    pub corrected_classification: Classification,
    pub reviewer_name: String,
    pub comments: String,
    pub confidence_at_review: Option<f64>,
    pub evidence: serde_json::Value,
    pub is_agreement: bool,
    pub timestamp: String,
}

/// Mined misclassification direction with its reviewer context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub id: i64,
    pub from_classification: Classification,
    pub to_classification: Classification,
    pub frequency: u32,
    pub context_samples: Vec<String>,
    pub created_at: String,
    pub last_seen: String,
}

impl LearnedPattern {
    pub fn involves(&self, class: Classification) -> bool {
        self.from_classification == class || self.to_classification == class
    }
}

/// Input for a new audit trail row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub document_name: String,
    pub classification: Classification,
    pub confidence: Option<f64>,
    pub user_id: String,
    pub action: AuditAction,
    pub details: serde_json::Value,
}

impl NewAuditEntry {
    pub fn system(
        document_name: &str,
        classification: Classification,
        confidence: Option<f64>,
        action: AuditAction,
        details: serde_json::Value,
    ) -> Self {
        Self {
            document_name: document_name.to_string(),
            classification,
            confidence,
            user_id: "system".to_string(),
            action,
            details,
        }
    }
}

/// One classification attempt on the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub document_name: String,
    pub classification: Classification,
    pub confidence: Option<f64>,
    pub timestamp: String,
    pub user_id: String,
    pub action: AuditAction,
    pub details: serde_json::Value,
    pub reviewed: bool,
    pub review_timestamp: Option<String>,
    pub reviewer_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonCorrection {
    pub from: Classification,
    pub to: Classification,
    pub count: u32,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgreementStats {
    pub agreements: u32,
    pub total: u32,
    pub accuracy: f64,
}

impl AgreementStats {
    pub fn new(agreements: u32, total: u32) -> Self {
        let accuracy = if total > 0 {
            agreements as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            agreements,
            total,
            accuracy,
        }
    }
}

/// What reviewers keep correcting, and how often each category is right.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionInsights {
    pub common_corrections: Vec<CommonCorrection>,
    pub accuracy_by_class: BTreeMap<String, AgreementStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationStats {
    pub total_documents: u32,
    pub reviewed_documents: u32,
    pub pending_review: u32,
    pub classification_counts: BTreeMap<String, u32>,
    pub average_confidence: BTreeMap<String, f64>,
}

/// Truncate to the stored sample length on a char boundary.
pub fn truncate_sample(text: &str) -> String {
    text.chars().take(CONTEXT_SAMPLE_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreement_derived_from_labels() {
        let mut submission = FeedbackSubmission {
            document_id: 1,
            original_classification: Classification::Confidential,
            corrected_classification: Classification::Confidential,
            reviewer_name: "rev".into(),
            comments: String::new(),
            confidence_at_review: None,
            evidence: serde_json::Value::Null,
        };
        assert!(submission.is_agreement());
        submission.corrected_classification = Classification::HighlySensitive;
        assert!(!submission.is_agreement());
    }

    #[test]
    fn agreement_stats_percentage() {
        let stats = AgreementStats::new(2, 3);
        assert!((stats.accuracy - 66.666).abs() < 0.01);
        assert_eq!(AgreementStats::new(0, 0).accuracy, 0.0);
    }

    #[test]
    fn truncate_sample_counts_chars() {
        let long = "é".repeat(250);
        assert_eq!(truncate_sample(&long).chars().count(), 200);
        assert_eq!(truncate_sample("short"), "short");
    }
}
