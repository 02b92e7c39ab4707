//! Reconciliation of primary and secondary opinions.

use serde::{Deserialize, Serialize};

use super::oracle::OracleError;
use crate::models::{Classification, ClassificationResult, Recommendation, SecondaryOpinion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Secondary verification was not run.
    NotRun,
    Agreed,
    Overridden,
    Disputed,
    /// Secondary verification ran but failed.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub result: ClassificationResult,
    pub outcome: ReconciliationOutcome,
    pub secondary: Option<SecondaryOpinion>,
}

pub fn reconcile(primary: ClassificationResult, secondary: Option<SecondaryOpinion>) -> Reconciled {
    let Some(opinion) = secondary else {
        return Reconciled {
            result: primary,
            outcome: ReconciliationOutcome::NotRun,
            secondary: None,
        };
    };

    if opinion.agreement {
        return Reconciled {
            result: primary,
            outcome: ReconciliationOutcome::Agreed,
            secondary: Some(opinion),
        };
    }

    // An override only replaces the primary with a recognized label.
    let usable_label = !matches!(
        opinion.your_classification,
        Classification::Unknown | Classification::Error
    );
    if opinion.recommendation == Recommendation::Override && usable_label {
        tracing::info!(
            from = %primary.classification,
            to = %opinion.your_classification,
            "Secondary verification overrode primary classification"
        );
        let result = ClassificationResult {
            classification: opinion.your_classification,
            confidence: opinion.confidence,
            primary_reason: "Secondary verification overrode primary classification".to_string(),
            detailed_reasoning: opinion.reasoning.clone(),
            evidence: opinion.additional_evidence.clone(),
            ..primary
        };
        return Reconciled {
            result,
            outcome: ReconciliationOutcome::Overridden,
            secondary: Some(opinion),
        };
    }

    let review_reason = format!(
        "Disagreement between classifiers. Primary: {}, Secondary: {}",
        primary.classification, opinion.your_classification
    );
    tracing::info!(reason = %review_reason, "Classifiers disagree, flagging for review");
    Reconciled {
        result: ClassificationResult {
            requires_human_review: true,
            review_reason,
            ..primary
        },
        outcome: ReconciliationOutcome::Disputed,
        secondary: Some(opinion),
    }
}

/// Keep the primary but flag it when the verification call itself failed.
pub fn secondary_unavailable(primary: ClassificationResult, error: &OracleError) -> Reconciled {
    tracing::warn!(error = %error, "Secondary verification failed, keeping primary");
    Reconciled {
        result: ClassificationResult {
            requires_human_review: true,
            review_reason: format!("Secondary verification failed: {error}"),
            ..primary
        },
        outcome: ReconciliationOutcome::Unavailable,
        secondary: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Evidence, PiiDetected};
    use crate::pipeline::oracle::secondary_from_value;

    fn primary() -> ClassificationResult {
        ClassificationResult {
            classification: Classification::Confidential,
            confidence: 0.7,
            primary_reason: "Internal markers".into(),
            detailed_reasoning: "Memo header".into(),
            pii_detected: PiiDetected { names: true, ..Default::default() },
            ..Default::default()
        }
    }

    fn opinion(agreement: bool, class: Classification, rec: Recommendation) -> SecondaryOpinion {
        SecondaryOpinion {
            agreement,
            your_classification: class,
            confidence: 0.93,
            discrepancies: vec![],
            additional_evidence: vec![Evidence {
                page: 2,
                location: "table".into(),
                finding: "SSN column".into(),
                category_trigger: "Highly Sensitive".into(),
            }],
            recommendation: rec,
            reasoning: "SSNs present".into(),
        }
    }

    #[test]
    fn no_secondary_returns_primary() {
        let reconciled = reconcile(primary(), None);
        assert_eq!(reconciled.outcome, ReconciliationOutcome::NotRun);
        assert_eq!(reconciled.result, primary());
    }

    #[test]
    fn agreement_returns_primary_unchanged() {
        let reconciled = reconcile(
            primary(),
            Some(opinion(true, Classification::Confidential, Recommendation::Confirm)),
        );
        assert_eq!(reconciled.outcome, ReconciliationOutcome::Agreed);
        assert_eq!(reconciled.result, primary());
    }

    #[test]
    fn override_takes_secondary_fields_keeps_pii() {
        let reconciled = reconcile(
            primary(),
            Some(opinion(false, Classification::HighlySensitive, Recommendation::Override)),
        );
        let result = reconciled.result;
        assert_eq!(reconciled.outcome, ReconciliationOutcome::Overridden);
        assert_eq!(result.classification, Classification::HighlySensitive);
        assert_eq!(result.confidence, 0.93);
        assert_eq!(result.detailed_reasoning, "SSNs present");
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(
            result.primary_reason,
            "Secondary verification overrode primary classification"
        );
        assert!(result.pii_detected.names);
    }

    #[test]
    fn disagreement_without_override_flags_review() {
        let reconciled = reconcile(
            primary(),
            Some(opinion(false, Classification::Public, Recommendation::Confirm)),
        );
        assert_eq!(reconciled.outcome, ReconciliationOutcome::Disputed);
        assert_eq!(reconciled.result.classification, Classification::Confidential);
        assert!(reconciled.result.requires_human_review);
        assert_eq!(
            reconciled.result.review_reason,
            "Disagreement between classifiers. Primary: Confidential, Secondary: Public"
        );
        assert!(reconciled.secondary.is_some());
    }

    #[test]
    fn override_with_unrecognized_label_keeps_primary() {
        let value = serde_json::json!({
            "agreement": false,
            "your_classification": "Different classification",
            "recommendation": "OVERRIDE"
        });
        let map = value.as_object().unwrap();
        let opinion = secondary_from_value(map);
        assert_eq!(opinion.your_classification, Classification::Unknown);

        let reconciled = reconcile(primary(), Some(opinion));
        assert_eq!(reconciled.outcome, ReconciliationOutcome::Disputed);
        assert_eq!(reconciled.result.classification, Classification::Confidential);
        assert!(reconciled.result.requires_human_review);
        assert_eq!(
            reconciled.result.review_reason,
            "Disagreement between classifiers. Primary: Confidential, Secondary: Unknown"
        );
    }

    #[test]
    fn failed_secondary_flags_review() {
        let reconciled = secondary_unavailable(primary(), &OracleError::Timeout(std::time::Duration::from_secs(120)));
        assert_eq!(reconciled.outcome, ReconciliationOutcome::Unavailable);
        assert_eq!(reconciled.result.classification, Classification::Confidential);
        assert!(reconciled.result.requires_human_review);
        assert!(reconciled.result.review_reason.starts_with("Secondary verification failed"));
    }
}
