pub mod assign;
pub mod cli;
pub mod config;
pub mod db;
pub mod documents;
pub mod ingest;
pub mod labeling;
pub mod labels;
pub mod model_store;
pub mod normalize;
pub mod partition;
pub mod schema;
pub mod status;
pub mod train;
pub mod vectorize;

#[derive(Debug)]
pub enum JobclustError {
    Database(rusqlite::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Bad or missing operator input: database, label file, config values, K mismatch.
    Config(String),
    /// Missing or untrainable model.
    Model(String),
    /// Label registry does not belong to the active model pair.
    Consistency(String),
}

impl std::fmt::Display for JobclustError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobclustError::Database(e) => write!(f, "database: {e}"),
            JobclustError::Io(e) => write!(f, "io: {e}"),
            JobclustError::Json(e) => write!(f, "json: {e}"),
            JobclustError::Config(msg) => write!(f, "config: {msg}"),
            JobclustError::Model(msg) => write!(f, "model: {msg}"),
            JobclustError::Consistency(msg) => write!(f, "consistency: {msg}"),
        }
    }
}

impl std::error::Error for JobclustError {}

impl From<rusqlite::Error> for JobclustError {
    fn from(e: rusqlite::Error) -> Self {
        JobclustError::Database(e)
    }
}

impl From<std::io::Error> for JobclustError {
    fn from(e: std::io::Error) -> Self {
        JobclustError::Io(e)
    }
}

impl From<serde_json::Error> for JobclustError {
    fn from(e: serde_json::Error) -> Self {
        JobclustError::Json(e)
    }
}

impl From<rusqlite_migration::Error> for JobclustError {
    fn from(e: rusqlite_migration::Error) -> Self {
        match e {
            rusqlite_migration::Error::RusqliteError { query: _, err } => JobclustError::Database(err),
            other => JobclustError::Config(format!("migration: {other}")),
        }
    }
}

pub fn schema_migrations() -> &'static rusqlite_migration::Migrations<'static> {
    &schema::MIGRATIONS
}

/// Current wall-clock time in epoch seconds.
pub(crate) fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
