//! Typed access to job-posting documents.
//!
//! The engine and trainer only see [`DocumentStore`]; [`SqliteDocuments`] is
//! the production implementation over the `documents` table.

use crate::JobclustError;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, params};
use std::borrow::Cow;

/// A document as read for training or assignment. Raw text stays bytes until
/// the engine decodes it, so encoding failures surface per document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub raw_text: Option<Vec<u8>>,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, raw_text: Option<&str>) -> Self {
        Self {
            id: id.into(),
            raw_text: raw_text.map(|t| t.as_bytes().to_vec()),
        }
    }
}

/// Everything written back for one processed document, in one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub clean_text: String,
    pub n_tokens: usize,
    /// `None` when the document had no usable tokens.
    pub cluster_id: Option<usize>,
    pub cluster_label: Option<String>,
    pub model_generation: Option<String>,
    pub processed_at: i64,
}

/// Fully stored document row.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub source: Option<String>,
    pub title: Option<String>,
    pub raw_text: Option<String>,
    pub clean_text: Option<String>,
    pub n_tokens: Option<usize>,
    pub cluster_id: Option<usize>,
    pub cluster_label: Option<String>,
    pub model_generation: Option<String>,
    pub processed_at: Option<i64>,
}

impl Document {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// A posting to insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDocument {
    pub id: String,
    pub source: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub url: Option<String>,
    pub raw_text: Option<String>,
}

pub trait DocumentStore {
    /// Documents without `processed_at`, at most `limit`. Fewest failed
    /// attempts first, then oldest, so failing documents never crowd out new ones.
    fn fetch_unprocessed(&self, limit: Option<usize>) -> Result<Vec<RawDocument>, JobclustError>;

    /// Every document with non-empty raw text, processed or not.
    fn fetch_training_texts(&self) -> Result<Vec<RawDocument>, JobclustError>;

    /// Write an assignment. Returns false if the document was already
    /// processed (or no longer exists); the write never lands partially.
    fn persist(&self, id: &str, assignment: &Assignment) -> Result<bool, JobclustError>;

    /// Note a failed attempt on an unprocessed document. It stays unprocessed.
    fn record_failure(&self, id: &str, reason: &str) -> Result<(), JobclustError>;
}

/// Strict UTF-8 decode: `None` on any invalid sequence.
pub fn decode_text(bytes: &[u8]) -> Option<Cow<'_, str>> {
    encoding_rs::UTF_8.decode_without_bom_handling_and_without_replacement(bytes)
}

fn raw_bytes(value: ValueRef<'_>) -> Option<Vec<u8>> {
    match value {
        ValueRef::Null => None,
        ValueRef::Text(b) | ValueRef::Blob(b) => Some(b.to_vec()),
        ValueRef::Integer(n) => Some(n.to_string().into_bytes()),
        ValueRef::Real(f) => Some(f.to_string().into_bytes()),
    }
}

pub struct SqliteDocuments {
    conn: Connection,
}

impl SqliteDocuments {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Insert unless the id already exists. Returns true if inserted.
    pub fn insert(&self, doc: &NewDocument) -> Result<bool, JobclustError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO documents (id, source, title, company, url, raw_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![doc.id, doc.source, doc.title, doc.company, doc.url, doc.raw_text],
        )?;
        Ok(inserted == 1)
    }

    pub fn get(&self, id: &str) -> Result<Option<Document>, JobclustError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, title, raw_text, clean_text, n_tokens, cluster_id,
                    cluster_label, model_generation, processed_at
             FROM documents WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], |r| {
            Ok(Document {
                id: r.get(0)?,
                source: r.get(1)?,
                title: r.get(2)?,
                raw_text: raw_bytes(r.get_ref(3)?).map(|b| String::from_utf8_lossy(&b).into_owned()),
                clean_text: r.get(4)?,
                n_tokens: r.get::<_, Option<i64>>(5)?.map(|n| n as usize),
                cluster_id: r.get::<_, Option<i64>>(6)?.map(|n| n as usize),
                cluster_label: r.get(7)?,
                model_generation: r.get(8)?,
                processed_at: r.get(9)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }

    fn fetch_raw<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<RawDocument>, JobclustError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |r| {
                Ok(RawDocument {
                    id: r.get(0)?,
                    raw_text: raw_bytes(r.get_ref(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl DocumentStore for SqliteDocuments {
    fn fetch_unprocessed(&self, limit: Option<usize>) -> Result<Vec<RawDocument>, JobclustError> {
        // LIMIT -1 is unbounded in SQLite.
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        self.fetch_raw(
            "SELECT id, raw_text FROM documents
             WHERE processed_at IS NULL
             ORDER BY attempts, ingested_at, id
             LIMIT ?1",
            [limit],
        )
    }

    fn fetch_training_texts(&self) -> Result<Vec<RawDocument>, JobclustError> {
        self.fetch_raw(
            "SELECT id, raw_text FROM documents
             WHERE raw_text IS NOT NULL AND length(raw_text) > 0
             ORDER BY id",
            [],
        )
    }

    fn persist(&self, id: &str, a: &Assignment) -> Result<bool, JobclustError> {
        let updated = self.conn.execute(
            "UPDATE documents
             SET clean_text = ?1, n_tokens = ?2, cluster_id = ?3, cluster_label = ?4,
                 model_generation = ?5, processed_at = ?6
             WHERE id = ?7 AND processed_at IS NULL",
            params![
                a.clean_text,
                a.n_tokens as i64,
                a.cluster_id.map(|c| c as i64),
                a.cluster_label,
                a.model_generation,
                a.processed_at,
                id
            ],
        )?;
        Ok(updated == 1)
    }

    fn record_failure(&self, id: &str, reason: &str) -> Result<(), JobclustError> {
        self.conn.execute(
            "UPDATE documents SET attempts = attempts + 1, last_error = ?1
             WHERE id = ?2 AND processed_at IS NULL",
            params![reason, id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db;

    fn store() -> (tempfile::TempDir, SqliteDocuments) {
        let dir = tempfile::TempDir::new().unwrap();
        let conn = open_db(&dir.path().join("jobs.db")).unwrap();
        (dir, SqliteDocuments::new(conn))
    }

    fn doc(id: &str, text: Option<&str>) -> NewDocument {
        NewDocument {
            id: id.into(),
            raw_text: text.map(String::from),
            ..Default::default()
        }
    }

    fn assignment(cluster: Option<usize>) -> Assignment {
        Assignment {
            clean_text: "python sql".into(),
            n_tokens: 2,
            cluster_id: cluster,
            cluster_label: cluster.map(|_| "Data Engineer".into()),
            model_generation: Some("0123456789abcdef".into()),
            processed_at: 1_700_000_000,
        }
    }

    #[test]
    fn insert_is_idempotent_by_id() {
        let (_dir, s) = store();
        assert!(s.insert(&doc("a", Some("python"))).unwrap());
        assert!(!s.insert(&doc("a", Some("different"))).unwrap());
        assert_eq!(s.get("a").unwrap().unwrap().raw_text.as_deref(), Some("python"));
    }

    #[test]
    fn unprocessed_respects_limit_and_order() {
        let (_dir, s) = store();
        for id in ["c", "a", "b"] {
            s.insert(&doc(id, Some("text"))).unwrap();
        }
        let all = s.fetch_unprocessed(None).unwrap();
        assert_eq!(all.len(), 3);
        let two = s.fetch_unprocessed(Some(2)).unwrap();
        assert_eq!(two.len(), 2);
    }

    #[test]
    fn persist_writes_all_fields_once() {
        let (_dir, s) = store();
        s.insert(&doc("a", Some("python sql"))).unwrap();

        assert!(s.persist("a", &assignment(Some(1))).unwrap());
        let d = s.get("a").unwrap().unwrap();
        assert_eq!(d.cluster_id, Some(1));
        assert_eq!(d.cluster_label.as_deref(), Some("Data Engineer"));
        assert_eq!(d.n_tokens, Some(2));
        assert_eq!(d.processed_at, Some(1_700_000_000));

        // Second write to a processed document is refused.
        let mut again = assignment(Some(0));
        again.processed_at = 1_800_000_000;
        assert!(!s.persist("a", &again).unwrap());
        let d = s.get("a").unwrap().unwrap();
        assert_eq!(d.cluster_id, Some(1));
        assert_eq!(d.processed_at, Some(1_700_000_000));
        assert!(s.fetch_unprocessed(None).unwrap().is_empty());
    }

    #[test]
    fn failed_documents_move_behind_fresh_ones() {
        let (_dir, s) = store();
        for id in ["a", "b", "c"] {
            s.insert(&doc(id, Some("text"))).unwrap();
        }
        s.record_failure("a", "unprocessed: bad bytes").unwrap();
        s.record_failure("a", "unprocessed: bad bytes").unwrap();
        s.record_failure("b", "unprocessed: bad bytes").unwrap();

        let order: Vec<String> = s.fetch_unprocessed(None).unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(order, ["c", "b", "a"]);

        let (attempts, err): (i64, Option<String>) = s
            .conn()
            .query_row("SELECT attempts, last_error FROM documents WHERE id = 'a'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(attempts, 2);
        assert_eq!(err.as_deref(), Some("unprocessed: bad bytes"));
        assert!(!s.get("a").unwrap().unwrap().is_processed());
    }

    #[test]
    fn training_texts_skip_null_and_empty() {
        let (_dir, s) = store();
        s.insert(&doc("a", Some("python"))).unwrap();
        s.insert(&doc("b", Some(""))).unwrap();
        s.insert(&doc("c", None)).unwrap();
        let texts = s.fetch_training_texts().unwrap();
        assert_eq!(texts, vec![RawDocument::new("a", Some("python"))]);
    }

    #[test]
    fn invalid_utf8_is_readable_as_bytes() {
        let (_dir, s) = store();
        s.insert(&doc("bad", None)).unwrap();
        s.conn()
            .execute(
                "UPDATE documents SET raw_text = ?1 WHERE id = 'bad'",
                [rusqlite::types::Value::Blob(vec![0x66, 0xff, 0xfe])],
            )
            .unwrap();
        let docs = s.fetch_unprocessed(None).unwrap();
        let raw = docs[0].raw_text.as_ref().unwrap();
        assert!(decode_text(raw).is_none());
    }

    #[test]
    fn decode_accepts_valid_utf8() {
        assert_eq!(decode_text("Ingénieur".as_bytes()).as_deref(), Some("Ingénieur"));
    }
}
