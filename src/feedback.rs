//! Reviewer feedback: recording verdicts and mining correction patterns.
//!
//! Every submission is stored. A disagreement also bumps the learned pattern
//! for its (original → corrected) pair, which the prompt enhancer reads back
//! on the next classification.

use std::sync::Arc;

use thiserror::Error;

use crate::db::{repository, DatabaseError, HitlStore};
use crate::models::{CommonCorrection, CorrectionInsights, FeedbackSubmission};

/// Minimum frequency for a pattern to show up in insights.
pub const INSIGHT_MIN_FREQUENCY: u32 = 3;
pub const INSIGHT_MAX_CORRECTIONS: u32 = 10;
pub const INSIGHT_EXAMPLES: usize = 3;

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Invalid feedback: {0}")]
    Validation(String),
}

pub struct FeedbackRecorder {
    store: Arc<HitlStore>,
}

impl FeedbackRecorder {
    pub fn new(store: Arc<HitlStore>) -> Self {
        Self { store }
    }

    /// Store one verdict atomically. Returns the feedback row id.
    pub fn record(&self, submission: &FeedbackSubmission) -> Result<i64, FeedbackError> {
        validate(submission)?;

        let feedback_id = self.store.transaction(|tx| {
            let id = repository::insert_feedback(tx, submission)?;

            let marked =
                repository::mark_reviewed(tx, submission.document_id, &submission.reviewer_name)?;
            if !marked {
                tracing::warn!(
                    document_id = submission.document_id,
                    "Feedback for unknown audit entry, stored without review mark"
                );
            }

            if !submission.is_agreement() {
                let pattern = repository::upsert_learned_pattern(
                    tx,
                    submission.original_classification,
                    submission.corrected_classification,
                    &submission.comments,
                )?;
                tracing::info!(
                    from = %pattern.from_classification,
                    to = %pattern.to_classification,
                    frequency = pattern.frequency,
                    "Learned pattern updated"
                );
            }
            Ok(id)
        })?;

        tracing::info!(
            feedback_id,
            document_id = submission.document_id,
            agreement = submission.is_agreement(),
            "Feedback recorded"
        );
        Ok(feedback_id)
    }

    /// Frequent corrections and per-class agreement.
    pub fn insights(&self) -> Result<CorrectionInsights, FeedbackError> {
        let patterns = self
            .store
            .frequent_patterns(INSIGHT_MIN_FREQUENCY, INSIGHT_MAX_CORRECTIONS)?;
        let common_corrections = patterns
            .into_iter()
            .map(|p| CommonCorrection {
                from: p.from_classification,
                to: p.to_classification,
                count: p.frequency,
                examples: p.context_samples.into_iter().take(INSIGHT_EXAMPLES).collect(),
            })
            .collect();

        Ok(CorrectionInsights {
            common_corrections,
            accuracy_by_class: self.store.agreement_by_class()?,
        })
    }
}

fn validate(submission: &FeedbackSubmission) -> Result<(), FeedbackError> {
    if submission.reviewer_name.trim().is_empty() {
        return Err(FeedbackError::Validation("reviewer name is required".into()));
    }
    if let Some(confidence) = submission.confidence_at_review {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(FeedbackError::Validation(format!(
                "confidence {confidence} outside [0, 1]"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, Classification, NewAuditEntry};

    fn setup() -> (Arc<HitlStore>, FeedbackRecorder) {
        let store = Arc::new(HitlStore::in_memory().unwrap());
        let recorder = FeedbackRecorder::new(store.clone());
        (store, recorder)
    }

    fn audit(store: &HitlStore, class: Classification) -> i64 {
        store
            .save_audit_log(&NewAuditEntry::system(
                "doc.pdf",
                class,
                Some(0.8),
                AuditAction::Classification,
                serde_json::json!({}),
            ))
            .unwrap()
    }

    fn submission(
        document_id: i64,
        original: Classification,
        corrected: Classification,
        comments: &str,
    ) -> FeedbackSubmission {
        FeedbackSubmission {
            document_id,
            original_classification: original,
            corrected_classification: corrected,
            reviewer_name: "dana".into(),
            comments: comments.into(),
            confidence_at_review: Some(0.8),
            evidence: serde_json::json!([]),
        }
    }

    #[test]
    fn three_corrections_build_one_pattern() {
        let (store, recorder) = setup();
        for comment in ["first", "second", "third"] {
            let id = audit(&store, Classification::Confidential);
            recorder
                .record(&submission(
                    id,
                    Classification::Confidential,
                    Classification::HighlySensitive,
                    comment,
                ))
                .unwrap();
        }

        let patterns = store.learned_patterns().unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].frequency, 3);
        assert_eq!(patterns[0].context_samples, vec!["first", "second", "third"]);
    }

    #[test]
    fn agreement_leaves_patterns_alone() {
        let (store, recorder) = setup();
        let id = audit(&store, Classification::Public);
        recorder
            .record(&submission(id, Classification::Public, Classification::Public, "fine"))
            .unwrap();

        assert!(store.learned_patterns().unwrap().is_empty());
        assert!(store.is_document_reviewed(id).unwrap());
        assert_eq!(store.feedback_history(Some(id), 10).unwrap().len(), 1);
    }

    #[test]
    fn re_review_is_permissive() {
        let (store, recorder) = setup();
        let id = audit(&store, Classification::Public);
        recorder
            .record(&submission(id, Classification::Public, Classification::Confidential, "a"))
            .unwrap();
        let first_review = store.audit_trail(10, true).unwrap()[0].review_timestamp.clone();

        let mut second = submission(id, Classification::Public, Classification::Confidential, "b");
        second.reviewer_name = "eli".into();
        recorder.record(&second).unwrap();

        let entry = store.audit_trail(10, true).unwrap().remove(0);
        assert_eq!(entry.review_timestamp, first_review);
        assert_eq!(entry.reviewer_name.as_deref(), Some("eli"));
        assert_eq!(store.feedback_history(Some(id), 10).unwrap().len(), 2);
        assert_eq!(store.learned_patterns().unwrap()[0].frequency, 2);
    }

    #[test]
    fn unknown_audit_id_still_stored() {
        let (store, recorder) = setup();
        recorder
            .record(&submission(999, Classification::Public, Classification::Unsafe, "x"))
            .unwrap();
        assert_eq!(store.feedback_history(None, 10).unwrap().len(), 1);
        assert_eq!(store.learned_patterns().unwrap().len(), 1);
    }

    #[test]
    fn validation_rejects_before_writing() {
        let (store, recorder) = setup();
        let mut bad = submission(1, Classification::Public, Classification::Unsafe, "x");
        bad.reviewer_name = "  ".into();
        assert!(matches!(recorder.record(&bad), Err(FeedbackError::Validation(_))));

        let mut bad = submission(1, Classification::Public, Classification::Unsafe, "x");
        bad.confidence_at_review = Some(1.5);
        assert!(matches!(recorder.record(&bad), Err(FeedbackError::Validation(_))));

        assert!(store.feedback_history(None, 10).unwrap().is_empty());
    }

    #[test]
    fn insights_threshold_between_two_and_three() {
        let (store, recorder) = setup();
        let record = |from, to, comment: &str| {
            let id = audit(&store, from);
            recorder.record(&submission(id, from, to, comment)).unwrap();
        };

        record(Classification::Public, Classification::Confidential, "p1");
        record(Classification::Public, Classification::Confidential, "p2");
        assert!(recorder.insights().unwrap().common_corrections.is_empty());

        record(Classification::Public, Classification::Confidential, "p3");
        record(Classification::Public, Classification::Confidential, "p4");
        let insights = recorder.insights().unwrap();
        assert_eq!(insights.common_corrections.len(), 1);
        let correction = &insights.common_corrections[0];
        assert_eq!(correction.from, Classification::Public);
        assert_eq!(correction.to, Classification::Confidential);
        assert_eq!(correction.count, 4);
        assert_eq!(correction.examples, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn insights_accuracy_by_class() {
        let (store, recorder) = setup();
        for corrected in [
            Classification::Confidential,
            Classification::Confidential,
            Classification::Confidential,
            Classification::Public,
        ] {
            let id = audit(&store, Classification::Confidential);
            recorder
                .record(&submission(id, Classification::Confidential, corrected, ""))
                .unwrap();
        }

        let insights = recorder.insights().unwrap();
        let stats = insights.accuracy_by_class["Confidential"];
        assert_eq!(stats.agreements, 3);
        assert_eq!(stats.total, 4);
        assert!((stats.accuracy - 75.0).abs() < 1e-9);
    }
}
