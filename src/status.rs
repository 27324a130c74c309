use crate::JobclustError;
use crate::cli::StatusArgs;
use crate::config::{load_config_from, resolve_settings};
use crate::db::{latest_training_run, open_db_readonly};
use crate::model_store::{FileModelStore, ModelStore};
use chrono::DateTime;
use rusqlite::Connection;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusCounts {
    pub total: i64,
    pub processed: i64,
    pub unclusterable: i64,
}

impl CorpusCounts {
    pub fn pending(&self) -> i64 {
        self.total - self.processed
    }
}

pub fn corpus_counts(conn: &Connection) -> Result<CorpusCounts, JobclustError> {
    Ok(conn.query_row(
        "SELECT COUNT(*),
                COUNT(processed_at),
                COALESCE(SUM(processed_at IS NOT NULL AND cluster_id IS NULL), 0)
         FROM documents",
        [],
        |r| {
            Ok(CorpusCounts {
                total: r.get(0)?,
                processed: r.get(1)?,
                unclusterable: r.get(2)?,
            })
        },
    )?)
}

/// Pending postings with at least one failed attempt.
pub fn failing_count(conn: &Connection) -> Result<i64, JobclustError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE processed_at IS NULL AND attempts > 0",
        [],
        |r| r.get(0),
    )?)
}

/// (cluster_id, label, count), largest first.
pub fn cluster_breakdown(conn: &Connection) -> Result<Vec<(i64, String, i64)>, JobclustError> {
    let mut stmt = conn.prepare(
        "SELECT cluster_id, COALESCE(cluster_label, ''), COUNT(*) FROM documents
         WHERE cluster_id IS NOT NULL
         GROUP BY cluster_id, cluster_label
         ORDER BY COUNT(*) DESC, cluster_id",
    )?;
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
        .collect::<Result<_, _>>()?;
    Ok(rows)
}

pub fn handle_status(db_path: &Path, config_path: Option<&Path>, args: &StatusArgs) -> Result<(), JobclustError> {
    if !db_path.exists() {
        eprintln!("jobclust: no database at {}", db_path.display());
        return Ok(());
    }

    let db_size = std::fs::metadata(db_path)?.len();
    let wal_path = db_path.with_extension("db-wal");
    let wal_size = std::fs::metadata(&wal_path).map(|m| m.len()).ok();

    let conn = open_db_readonly(db_path)?;
    let counts = corpus_counts(&conn)?;
    let clusters = cluster_breakdown(&conn)?;

    match wal_size {
        Some(ws) => eprintln!("jobclust: database: {} (+{} WAL)", fmt_size(db_size), fmt_size(ws)),
        None => eprintln!("jobclust: database: {}", fmt_size(db_size)),
    }
    eprintln!(
        "jobclust: postings: {} ({} processed, {} pending, {} unclusterable)",
        counts.total,
        counts.processed,
        counts.pending(),
        counts.unclusterable
    );
    // Databases from before failure tracking have no attempts column.
    if let Ok(failing) = failing_count(&conn)
        && failing > 0
    {
        eprintln!("jobclust:   {failing} pending postings failed at least once (see documents.last_error)");
    }
    for (cluster_id, label, count) in &clusters {
        eprintln!("jobclust:   cluster {cluster_id} {label}: {count}");
    }

    let config = load_config_from(config_path)?;
    let settings = resolve_settings(&config, args.k, None, false);
    let k = settings.partition.k;
    let store = FileModelStore::new(&settings.models_dir);

    // A corrupt artifact is reported, not fatal, here.
    match store.load(k) {
        Ok(Some(pair)) => eprintln!(
            "jobclust: model k={k}: generation {}, {} terms, trained {} on {} postings",
            pair.generation,
            pair.vectorizer.dim(),
            format_epoch_date(pair.trained_at),
            pair.n_documents
        ),
        Ok(None) => eprintln!("jobclust: model k={k}: none (run `jobclust train`)"),
        Err(e) => eprintln!("jobclust: model k={k}: unreadable ({e})"),
    }

    // Read-only connections skip migrations; an old database may lack the ledger.
    if let Ok(Some(run)) = latest_training_run(&conn, k) {
        eprintln!(
            "jobclust: last training run #{}: {} ({} postings, inertia {})",
            run.id,
            format_epoch_date(run.created_at),
            run.n_documents,
            run.inertia.map(|i| format!("{i:.4}")).unwrap_or_else(|| "n/a".into())
        );
    }

    Ok(())
}

fn format_epoch_date(epoch_secs: i64) -> String {
    DateTime::from_timestamp(epoch_secs, 0)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| format!("@{epoch_secs}"))
}

const SIZE_UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

fn fmt_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < SIZE_UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", SIZE_UNITS[unit])
}
