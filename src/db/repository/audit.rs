use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};

use super::{classification_from_db, now_timestamp};
use crate::db::DatabaseError;
use crate::models::{AuditAction, AuditEntry, NewAuditEntry};

const AUDIT_COLUMNS: &str = "id, document_name, classification, confidence, timestamp, user_id,
     action, details, reviewed, review_timestamp, reviewer_name";

/// Insert one audit entry and return its id.
pub fn insert_audit_entry(conn: &Connection, entry: &NewAuditEntry) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO audit_trail (document_name, classification, confidence, timestamp, user_id, action, details)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.document_name,
            entry.classification.as_str(),
            entry.confidence,
            now_timestamp(),
            entry.user_id,
            entry.action.as_str(),
            serde_json::to_string(&entry.details)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_audit_entry(conn: &Connection, id: i64) -> Result<Option<AuditEntry>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {AUDIT_COLUMNS} FROM audit_trail WHERE id = ?1"),
            params![id],
            read_audit_row,
        )
        .optional()?;
    row.map(audit_from_row).transpose()
}

/// Newest-first audit entries, optionally hiding reviewed ones.
pub fn get_audit_trail(
    conn: &Connection,
    limit: u32,
    include_reviewed: bool,
) -> Result<Vec<AuditEntry>, DatabaseError> {
    let filter = if include_reviewed { "" } else { "WHERE reviewed = 0" };
    query_audit(
        conn,
        &format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_trail {filter}
             ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ),
        limit,
    )
}

/// Entries still awaiting a reviewer, newest first.
pub fn get_unreviewed(conn: &Connection, limit: u32) -> Result<Vec<AuditEntry>, DatabaseError> {
    query_audit(
        conn,
        &format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_trail
             WHERE reviewed = 0 AND classification IS NOT NULL
             ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ),
        limit,
    )
}

/// Mark an entry reviewed. The first review timestamp is kept on re-review.
///
/// Returns false when no entry has this id.
pub fn mark_reviewed(conn: &Connection, id: i64, reviewer_name: &str) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE audit_trail
         SET reviewed = 1,
             review_timestamp = COALESCE(review_timestamp, ?2),
             reviewer_name = ?3
         WHERE id = ?1",
        params![id, now_timestamp(), reviewer_name],
    )?;
    Ok(updated > 0)
}

pub fn is_document_reviewed(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let reviewed = conn
        .query_row(
            "SELECT reviewed FROM audit_trail WHERE id = ?1",
            params![id],
            |row| row.get::<_, i32>(0),
        )
        .optional()?;
    Ok(reviewed == Some(1))
}

// ── Row mapping ──

struct AuditRow {
    id: i64,
    document_name: String,
    classification: String,
    confidence: Option<f64>,
    timestamp: String,
    user_id: String,
    action: String,
    details: String,
    reviewed: i32,
    review_timestamp: Option<String>,
    reviewer_name: Option<String>,
}

fn read_audit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok(AuditRow {
        id: row.get(0)?,
        document_name: row.get(1)?,
        classification: row.get(2)?,
        confidence: row.get(3)?,
        timestamp: row.get(4)?,
        user_id: row.get(5)?,
        action: row.get(6)?,
        details: row.get(7)?,
        reviewed: row.get(8)?,
        review_timestamp: row.get(9)?,
        reviewer_name: row.get(10)?,
    })
}

fn audit_from_row(row: AuditRow) -> Result<AuditEntry, DatabaseError> {
    Ok(AuditEntry {
        id: row.id,
        document_name: row.document_name,
        classification: classification_from_db(&row.classification)?,
        confidence: row.confidence,
        timestamp: row.timestamp,
        user_id: row.user_id,
        action: AuditAction::from_str(&row.action)?,
        details: serde_json::from_str(&row.details).unwrap_or(serde_json::Value::Null),
        reviewed: row.reviewed != 0,
        review_timestamp: row.review_timestamp,
        reviewer_name: row.reviewer_name,
    })
}

fn query_audit(conn: &Connection, sql: &str, limit: u32) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![limit], read_audit_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(audit_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Classification;

    fn entry(name: &str, class: Classification) -> NewAuditEntry {
        NewAuditEntry::system(
            name,
            class,
            Some(0.8),
            AuditAction::Classification,
            serde_json::json!({"status": "success"}),
        )
    }

    #[test]
    fn insert_and_get_round_trip() {
        let conn = open_memory_database().unwrap();
        let id = insert_audit_entry(&conn, &entry("memo.txt", Classification::Confidential)).unwrap();

        let stored = get_audit_entry(&conn, id).unwrap().unwrap();
        assert_eq!(stored.document_name, "memo.txt");
        assert_eq!(stored.classification, Classification::Confidential);
        assert_eq!(stored.user_id, "system");
        assert_eq!(stored.details["status"], "success");
        assert!(!stored.reviewed);
        assert!(get_audit_entry(&conn, id + 100).unwrap().is_none());
    }

    #[test]
    fn unreviewed_excludes_reviewed_entries() {
        let conn = open_memory_database().unwrap();
        let a = insert_audit_entry(&conn, &entry("a", Classification::Public)).unwrap();
        let b = insert_audit_entry(&conn, &entry("b", Classification::Public)).unwrap();

        assert!(mark_reviewed(&conn, a, "alice").unwrap());

        let pending = get_unreviewed(&conn, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b);

        assert_eq!(get_audit_trail(&conn, 10, true).unwrap().len(), 2);
        assert_eq!(get_audit_trail(&conn, 10, false).unwrap().len(), 1);
    }

    #[test]
    fn newest_entries_first() {
        let conn = open_memory_database().unwrap();
        let first = insert_audit_entry(&conn, &entry("a", Classification::Public)).unwrap();
        let second = insert_audit_entry(&conn, &entry("b", Classification::Public)).unwrap();
        let trail = get_audit_trail(&conn, 10, true).unwrap();
        assert_eq!(trail[0].id, second);
        assert_eq!(trail[1].id, first);
        assert_eq!(get_audit_trail(&conn, 1, true).unwrap().len(), 1);
    }

    #[test]
    fn re_review_keeps_first_timestamp() {
        let conn = open_memory_database().unwrap();
        let id = insert_audit_entry(&conn, &entry("a", Classification::Public)).unwrap();

        mark_reviewed(&conn, id, "alice").unwrap();
        let first = get_audit_entry(&conn, id).unwrap().unwrap();
        mark_reviewed(&conn, id, "bob").unwrap();
        let second = get_audit_entry(&conn, id).unwrap().unwrap();

        assert!(second.reviewed);
        assert_eq!(first.review_timestamp, second.review_timestamp);
        assert_eq!(second.reviewer_name.as_deref(), Some("bob"));
        assert!(is_document_reviewed(&conn, id).unwrap());
    }

    #[test]
    fn mark_reviewed_missing_entry() {
        let conn = open_memory_database().unwrap();
        assert!(!mark_reviewed(&conn, 42, "alice").unwrap());
        assert!(!is_document_reviewed(&conn, 42).unwrap());
    }
}
