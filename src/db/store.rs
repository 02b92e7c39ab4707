//! Shared handle on the HITL database.
//!
//! One connection behind a `Mutex`: every write path (audit logging,
//! feedback, pattern upserts) is serialized, and multi-statement writes run in
//! an IMMEDIATE transaction so a second process cannot interleave either.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::{
    AgreementStats, AuditEntry, ClassificationStats, FeedbackRecord, LearnedPattern, NewAuditEntry,
};

pub struct HitlStore {
    conn: Mutex<Connection>,
}

impl HitlStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        tracing::debug!(path = %path.display(), "Opening HITL database");
        Ok(Self::from_connection(open_database(path)?))
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    /// Run `f` against the connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside an IMMEDIATE transaction; commits on `Ok`, rolls back on `Err`.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ── Persistence contract ─────────────────────────────────

    pub fn save_audit_log(&self, entry: &NewAuditEntry) -> Result<i64, DatabaseError> {
        self.with_conn(|conn| repository::insert_audit_entry(conn, entry))
    }

    pub fn unreviewed(&self, limit: u32) -> Result<Vec<AuditEntry>, DatabaseError> {
        self.with_conn(|conn| repository::get_unreviewed(conn, limit))
    }

    pub fn audit_trail(&self, limit: u32, include_reviewed: bool) -> Result<Vec<AuditEntry>, DatabaseError> {
        self.with_conn(|conn| repository::get_audit_trail(conn, limit, include_reviewed))
    }

    pub fn is_document_reviewed(&self, id: i64) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| repository::is_document_reviewed(conn, id))
    }

    pub fn feedback_history(
        &self,
        document_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<FeedbackRecord>, DatabaseError> {
        self.with_conn(|conn| repository::get_feedback_history(conn, document_id, limit))
    }

    pub fn learned_patterns(&self) -> Result<Vec<LearnedPattern>, DatabaseError> {
        self.with_conn(repository::get_learned_patterns)
    }

    pub fn frequent_patterns(&self, min_frequency: u32, limit: u32) -> Result<Vec<LearnedPattern>, DatabaseError> {
        self.with_conn(|conn| repository::get_frequent_patterns(conn, min_frequency, limit))
    }

    pub fn agreement_by_class(&self) -> Result<BTreeMap<String, AgreementStats>, DatabaseError> {
        self.with_conn(repository::get_agreement_by_class)
    }

    pub fn classification_stats(&self) -> Result<ClassificationStats, DatabaseError> {
        self.with_conn(repository::get_classification_stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, Classification};

    #[test]
    fn transaction_rolls_back_on_error() {
        let store = HitlStore::in_memory().unwrap();
        let result: Result<(), DatabaseError> = store.transaction(|tx| {
            repository::upsert_learned_pattern(tx, Classification::Public, Classification::Confidential, "x")?;
            Err(DatabaseError::ConstraintViolation("abort".into()))
        });
        assert!(result.is_err());
        assert!(store.learned_patterns().unwrap().is_empty());
    }

    #[test]
    fn audit_log_visible_through_store() {
        let store = HitlStore::in_memory().unwrap();
        let id = store
            .save_audit_log(&NewAuditEntry::system(
                "a.txt",
                Classification::Public,
                Some(0.9),
                AuditAction::Classification,
                serde_json::json!({}),
            ))
            .unwrap();
        let pending = store.unreviewed(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert!(!store.is_document_reviewed(id).unwrap());
        assert_eq!(store.classification_stats().unwrap().total_documents, 1);
    }

    #[test]
    fn concurrent_upserts_do_not_lose_updates() {
        let store = std::sync::Arc::new(HitlStore::in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .transaction(|tx| {
                            repository::upsert_learned_pattern(
                                tx,
                                Classification::Confidential,
                                Classification::HighlySensitive,
                                &format!("comment {i}"),
                            )
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let patterns = store.learned_patterns().unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].frequency, 8);
        assert_eq!(patterns[0].context_samples.len(), 8);
    }
}
