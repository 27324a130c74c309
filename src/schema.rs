use rusqlite_migration::{M, Migrations};
use std::sync::LazyLock;

pub static MIGRATIONS: LazyLock<Migrations<'static>> = LazyLock::new(|| {
    Migrations::new(vec![
        M::up(
            "
CREATE TABLE documents (
    id               TEXT PRIMARY KEY,
    source           TEXT,
    title            TEXT,
    company          TEXT,
    url              TEXT,
    raw_text         TEXT,
    ingested_at      INTEGER NOT NULL DEFAULT (unixepoch('now')),
    clean_text       TEXT,
    n_tokens         INTEGER,
    cluster_id       INTEGER,
    cluster_label    TEXT,
    processed_at     INTEGER
);

CREATE INDEX idx_docs_pending ON documents(ingested_at, id) WHERE processed_at IS NULL;
CREATE INDEX idx_docs_cluster ON documents(cluster_id) WHERE cluster_id IS NOT NULL;
",
        ),
        M::up(
            "
CREATE TABLE training_runs (
    id           INTEGER PRIMARY KEY,
    created_at   INTEGER NOT NULL DEFAULT (unixepoch('now')),
    k            INTEGER NOT NULL,
    generation   TEXT NOT NULL,
    n_documents  INTEGER NOT NULL,
    vocab_size   INTEGER NOT NULL,
    inertia      REAL
);
CREATE INDEX idx_tr_k ON training_runs(k, created_at);

ALTER TABLE documents ADD COLUMN model_generation TEXT;
",
        ),
        M::up(
            "
ALTER TABLE documents ADD COLUMN attempts INTEGER NOT NULL DEFAULT 0;
ALTER TABLE documents ADD COLUMN last_error TEXT;

DROP INDEX idx_docs_pending;
CREATE INDEX idx_docs_pending ON documents(attempts, ingested_at, id) WHERE processed_at IS NULL;
",
        ),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_valid() {
        assert!(MIGRATIONS.validate().is_ok());
    }

    #[test]
    fn migrations_apply_to_memory_db() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        MIGRATIONS.to_latest(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"documents".into()));
        assert!(tables.contains(&"training_runs".into()));

        let columns: Vec<String> = conn
            .prepare("SELECT name FROM pragma_table_info('documents')")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for col in [
            "clean_text", "n_tokens", "cluster_id", "cluster_label", "processed_at", "model_generation",
            "attempts", "last_error",
        ] {
            assert!(columns.contains(&col.to_string()), "missing column {col}");
        }
    }
}
