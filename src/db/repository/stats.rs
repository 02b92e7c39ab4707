use rusqlite::Connection;

use crate::db::DatabaseError;
use crate::models::ClassificationStats;

/// Totals, review progress and per-class averages over the audit trail.
pub fn get_classification_stats(conn: &Connection) -> Result<ClassificationStats, DatabaseError> {
    let (total_documents, reviewed_documents): (u32, u32) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN reviewed = 1 THEN 1 ELSE 0 END), 0) FROM audit_trail",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut stats = ClassificationStats {
        total_documents,
        reviewed_documents,
        pending_review: total_documents.saturating_sub(reviewed_documents),
        ..Default::default()
    };

    let mut stmt = conn.prepare(
        "SELECT classification, COUNT(*), AVG(confidence)
         FROM audit_trail
         GROUP BY classification",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, Option<f64>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (class, count, avg_confidence) in rows {
        if let Some(avg) = avg_confidence {
            stats.average_confidence.insert(class.clone(), avg);
        }
        stats.classification_counts.insert(class, count);
    }

    Ok(stats)
}
