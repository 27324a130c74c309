use crate::JobclustError;
use crate::schema::MIGRATIONS;
use rusqlite::{Connection, params};
use std::path::Path;

/// Apply standard PRAGMAs (before migrations).
fn apply_pragmas(conn: &Connection, readonly: bool) -> Result<(), JobclustError> {
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    if !readonly {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    Ok(())
}

// --- Public open functions ---

/// Open (creating if needed) and migrate. Used by ingest.
pub fn open_db(db_path: &Path) -> Result<Connection, JobclustError> {
    if let Some(dir) = db_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
    }

    let mut conn = Connection::open(db_path)?;
    apply_pragmas(&conn, false)?;
    MIGRATIONS.to_latest(&mut conn)?;
    Ok(conn)
}

/// Open an existing database and migrate. A missing file is a config error,
/// never an empty new database.
pub fn open_db_existing(db_path: &Path) -> Result<Connection, JobclustError> {
    if !db_path.exists() {
        return Err(JobclustError::Config(format!(
            "database not found: {}",
            db_path.display()
        )));
    }
    open_db(db_path)
}

pub fn open_db_readonly(db_path: &Path) -> Result<Connection, JobclustError> {
    if !db_path.exists() {
        return Err(JobclustError::Config(format!(
            "database not found: {}",
            db_path.display()
        )));
    }

    let conn = Connection::open_with_flags(
        db_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    apply_pragmas(&conn, true)?;
    Ok(conn)
}

// --- Training ledger ---

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRun {
    pub id: i64,
    pub created_at: i64,
    pub k: usize,
    pub generation: String,
    pub n_documents: usize,
    pub vocab_size: usize,
    pub inertia: Option<f64>,
}

/// Record a completed training run. Returns the run ID.
pub fn record_training_run(
    conn: &Connection,
    k: usize,
    generation: &str,
    n_documents: usize,
    vocab_size: usize,
    inertia: f64,
) -> Result<i64, JobclustError> {
    conn.execute(
        "INSERT INTO training_runs (k, generation, n_documents, vocab_size, inertia)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![k as i64, generation, n_documents as i64, vocab_size as i64, inertia],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn latest_training_run(conn: &Connection, k: usize) -> Result<Option<TrainingRun>, JobclustError> {
    let mut stmt = conn.prepare(
        "SELECT id, created_at, k, generation, n_documents, vocab_size, inertia
         FROM training_runs WHERE k = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map([k as i64], |r| {
        Ok(TrainingRun {
            id: r.get(0)?,
            created_at: r.get(1)?,
            k: r.get::<_, i64>(2)? as usize,
            generation: r.get(3)?,
            n_documents: r.get::<_, i64>(4)? as usize,
            vocab_size: r.get::<_, i64>(5)? as usize,
            inertia: r.get(6)?,
        })
    })?;
    Ok(rows.next().transpose()?)
}
