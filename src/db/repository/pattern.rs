use rusqlite::{params, Connection, OptionalExtension};

use super::{classification_from_db, now_timestamp};
use crate::db::DatabaseError;
use crate::models::{truncate_sample, Classification, LearnedPattern};

const PATTERN_COLUMNS: &str =
    "id, from_classification, to_classification, frequency, context_samples, created_at, last_seen";

/// Record one correction of `from` into `to`.
///
/// Creates the pattern at frequency 1 or increments it, appending the
/// truncated comment either way. The read-increment-write is not atomic on
/// its own: call inside a transaction that holds the write lock.
pub fn upsert_learned_pattern(
    conn: &Connection,
    from: Classification,
    to: Classification,
    comment: &str,
) -> Result<LearnedPattern, DatabaseError> {
    let sample = truncate_sample(comment);
    let now = now_timestamp();

    let existing = conn
        .query_row(
            "SELECT id, context_samples FROM learned_patterns
             WHERE from_classification = ?1 AND to_classification = ?2",
            params![from.as_str(), to.as_str()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    let id = match existing {
        Some((id, samples_json)) => {
            let mut samples: Vec<String> = serde_json::from_str(&samples_json)?;
            samples.push(sample);
            conn.execute(
                "UPDATE learned_patterns
                 SET frequency = frequency + 1, last_seen = ?2, context_samples = ?3
                 WHERE id = ?1",
                params![id, now, serde_json::to_string(&samples)?],
            )?;
            id
        }
        None => {
            conn.execute(
                "INSERT INTO learned_patterns
                 (pattern_type, from_classification, to_classification, frequency, context_samples, created_at, last_seen)
                 VALUES ('misclassification', ?1, ?2, 1, ?3, ?4, ?4)",
                params![
                    from.as_str(),
                    to.as_str(),
                    serde_json::to_string(&vec![sample])?,
                    now,
                ],
            )?;
            conn.last_insert_rowid()
        }
    };

    get_learned_pattern(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "LearnedPattern".into(),
        id: id.to_string(),
    })
}

pub fn get_learned_pattern(conn: &Connection, id: i64) -> Result<Option<LearnedPattern>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PATTERN_COLUMNS} FROM learned_patterns WHERE id = ?1"),
            params![id],
            read_pattern_row,
        )
        .optional()?;
    row.map(pattern_from_row).transpose()
}

/// All patterns, most frequent first, ties broken by most recent.
pub fn get_learned_patterns(conn: &Connection) -> Result<Vec<LearnedPattern>, DatabaseError> {
    query_patterns(
        conn,
        &format!(
            "SELECT {PATTERN_COLUMNS} FROM learned_patterns
             ORDER BY frequency DESC, last_seen DESC, id DESC"
        ),
        params![],
    )
}

/// Patterns at or above `min_frequency`, in the same order, capped at `limit`.
pub fn get_frequent_patterns(
    conn: &Connection,
    min_frequency: u32,
    limit: u32,
) -> Result<Vec<LearnedPattern>, DatabaseError> {
    query_patterns(
        conn,
        &format!(
            "SELECT {PATTERN_COLUMNS} FROM learned_patterns
             WHERE frequency >= ?1
             ORDER BY frequency DESC, last_seen DESC, id DESC
             LIMIT ?2"
        ),
        params![min_frequency, limit],
    )
}

struct PatternRow {
    id: i64,
    from: String,
    to: String,
    frequency: u32,
    samples: String,
    created_at: String,
    last_seen: String,
}

fn read_pattern_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatternRow> {
    Ok(PatternRow {
        id: row.get(0)?,
        from: row.get(1)?,
        to: row.get(2)?,
        frequency: row.get(3)?,
        samples: row.get(4)?,
        created_at: row.get(5)?,
        last_seen: row.get(6)?,
    })
}

fn pattern_from_row(row: PatternRow) -> Result<LearnedPattern, DatabaseError> {
    Ok(LearnedPattern {
        id: row.id,
        from_classification: classification_from_db(&row.from)?,
        to_classification: classification_from_db(&row.to)?,
        frequency: row.frequency,
        context_samples: serde_json::from_str(&row.samples)?,
        created_at: row.created_at,
        last_seen: row.last_seen,
    })
}

fn query_patterns(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<LearnedPattern>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, read_pattern_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(pattern_from_row).collect()
}
