use std::collections::BTreeMap;

use rusqlite::{params, Connection};

use super::{classification_from_db, now_timestamp};
use crate::db::DatabaseError;
use crate::models::{AgreementStats, FeedbackRecord, FeedbackSubmission};

pub fn insert_feedback(conn: &Connection, feedback: &FeedbackSubmission) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO feedback (document_id, original_classification, corrected_classification,
         reviewer_name, reviewer_comments, timestamp, confidence_score, evidence, is_agreement)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            feedback.document_id,
            feedback.original_classification.as_str(),
            feedback.corrected_classification.as_str(),
            feedback.reviewer_name,
            feedback.comments,
            now_timestamp(),
            feedback.confidence_at_review,
            serde_json::to_string(&feedback.evidence)?,
            feedback.is_agreement() as i32,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Feedback rows newest first, optionally for one audited document.
pub fn get_feedback_history(
    conn: &Connection,
    document_id: Option<i64>,
    limit: u32,
) -> Result<Vec<FeedbackRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, document_id, original_classification, corrected_classification, reviewer_name,
         reviewer_comments, confidence_score, evidence, is_agreement, timestamp
         FROM feedback
         WHERE (?1 IS NULL OR document_id = ?1)
         ORDER BY timestamp DESC, id DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![document_id, limit], |row| {
            Ok(FeedbackRow {
                id: row.get(0)?,
                document_id: row.get(1)?,
                original: row.get(2)?,
                corrected: row.get(3)?,
                reviewer_name: row.get(4)?,
                comments: row.get(5)?,
                confidence: row.get(6)?,
                evidence: row.get(7)?,
                is_agreement: row.get(8)?,
                timestamp: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(feedback_from_row).collect()
}

/// Agreement counts per original classification across all feedback.
pub fn get_agreement_by_class(conn: &Connection) -> Result<BTreeMap<String, AgreementStats>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT original_classification,
                SUM(CASE WHEN is_agreement = 1 THEN 1 ELSE 0 END) AS agreements,
                COUNT(*) AS total
         FROM feedback
         GROUP BY original_classification",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, u32>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .map(|(class, agreements, total)| (class, AgreementStats::new(agreements, total)))
        .collect())
}

struct FeedbackRow {
    id: i64,
    document_id: i64,
    original: String,
    corrected: String,
    reviewer_name: String,
    comments: String,
    confidence: Option<f64>,
    evidence: String,
    is_agreement: i32,
    timestamp: String,
}

fn feedback_from_row(row: FeedbackRow) -> Result<FeedbackRecord, DatabaseError> {
    Ok(FeedbackRecord {
        id: row.id,
        document_id: row.document_id,
        original_classification: classification_from_db(&row.original)?,
        corrected_classification: classification_from_db(&row.corrected)?,
        reviewer_name: row.reviewer_name,
        comments: row.comments,
        confidence_at_review: row.confidence,
        evidence: serde_json::from_str(&row.evidence).unwrap_or(serde_json::Value::Null),
        is_agreement: row.is_agreement != 0,
        timestamp: row.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Classification;

    fn submission(doc: i64, from: Classification, to: Classification) -> FeedbackSubmission {
        FeedbackSubmission {
            document_id: doc,
            original_classification: from,
            corrected_classification: to,
            reviewer_name: "reviewer".into(),
            comments: "note".into(),
            confidence_at_review: Some(0.7),
            evidence: serde_json::json!([]),
        }
    }

    #[test]
    fn history_filters_by_document() {
        let conn = open_memory_database().unwrap();
        insert_feedback(&conn, &submission(1, Classification::Public, Classification::Public)).unwrap();
        insert_feedback(&conn, &submission(2, Classification::Public, Classification::Confidential)).unwrap();
        insert_feedback(&conn, &submission(2, Classification::Confidential, Classification::Confidential)).unwrap();

        assert_eq!(get_feedback_history(&conn, None, 10).unwrap().len(), 3);
        let doc2 = get_feedback_history(&conn, Some(2), 10).unwrap();
        assert_eq!(doc2.len(), 2);
        assert!(doc2.iter().all(|f| f.document_id == 2));
        assert!(doc2[0].is_agreement);
        assert!(!doc2[1].is_agreement);
    }

    #[test]
    fn agreement_rates_grouped_by_original() {
        let conn = open_memory_database().unwrap();
        insert_feedback(&conn, &submission(1, Classification::Public, Classification::Public)).unwrap();
        insert_feedback(&conn, &submission(2, Classification::Public, Classification::Confidential)).unwrap();
        insert_feedback(&conn, &submission(3, Classification::Public, Classification::Public)).unwrap();
        insert_feedback(&conn, &submission(4, Classification::Confidential, Classification::Confidential)).unwrap();

        let stats = get_agreement_by_class(&conn).unwrap();
        let public = stats["Public"];
        assert_eq!(public.agreements, 2);
        assert_eq!(public.total, 3);
        assert!((public.accuracy - 66.67).abs() < 0.01);
        assert_eq!(stats["Confidential"].accuracy, 100.0);
    }
}
