//! JSON Lines ingestion into the documents table.
//!
//! Each line is one posting. Lines without an explicit `id` get a stable
//! content hash so re-ingesting the same export is a no-op.

use crate::JobclustError;
use crate::cli::IngestArgs;
use crate::db::open_db;
use crate::documents::{NewDocument, SqliteDocuments};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Inserts are committed in chunks of this many lines.
const COMMIT_EVERY: usize = 500;

#[derive(Debug, Deserialize)]
struct PostingLine {
    id: Option<String>,
    source: Option<String>,
    title: Option<String>,
    company: Option<String>,
    url: Option<String>,
    #[serde(alias = "text", alias = "raw_text")]
    description: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Stable id: the url when present, else title and body.
pub fn posting_id(source: Option<&str>, url: Option<&str>, title: Option<&str>, body: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    match url.filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            hasher.update(b"url\x1f");
            hasher.update(source.unwrap_or("").as_bytes());
            hasher.update(b"\x1f");
            hasher.update(url.trim().as_bytes());
        }
        None => {
            hasher.update(b"text\x1f");
            hasher.update(title.unwrap_or("").as_bytes());
            hasher.update(b"\x1f");
            hasher.update(body.unwrap_or("").as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Raw text is title then description; absent when both are.
fn raw_text(title: Option<&str>, body: Option<&str>) -> Option<String> {
    match (title, body) {
        (Some(t), Some(b)) => Some(format!("{t}\n{b}")),
        (Some(t), None) => Some(t.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    }
}

fn to_document(line: PostingLine, default_source: Option<&str>) -> NewDocument {
    let source = line.source.or_else(|| default_source.map(String::from));
    let id = match line.id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => posting_id(
            source.as_deref(),
            line.url.as_deref(),
            line.title.as_deref(),
            line.description.as_deref(),
        ),
    };
    NewDocument {
        id,
        raw_text: raw_text(line.title.as_deref(), line.description.as_deref()),
        source,
        title: line.title,
        company: line.company,
        url: line.url,
    }
}

/// Read postings from `reader` into `store`. Malformed lines are counted and skipped.
pub fn ingest_lines<R: BufRead>(
    store: &SqliteDocuments,
    reader: R,
    default_source: Option<&str>,
) -> Result<IngestReport, JobclustError> {
    let mut report = IngestReport::default();
    let mut tx = store.conn().unchecked_transaction()?;
    let mut pending = 0;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let posting: PostingLine = match serde_json::from_str(&line) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("line {}: {e}", lineno + 1);
                report.rejected += 1;
                continue;
            }
        };

        if store.insert(&to_document(posting, default_source))? {
            report.inserted += 1;
        } else {
            report.duplicates += 1;
        }

        pending += 1;
        if pending == COMMIT_EVERY {
            tx.commit()?;
            tx = store.conn().unchecked_transaction()?;
            pending = 0;
        }
    }
    tx.commit()?;
    Ok(report)
}

pub fn handle_ingest(db_path: &Path, args: &IngestArgs) -> Result<(), JobclustError> {
    let file = std::fs::File::open(&args.file)?;
    let store = SqliteDocuments::new(open_db(db_path)?);
    let report = ingest_lines(&store, BufReader::new(file), args.source.as_deref())?;

    log::info!("ingested {}: {report:?}", args.file.display());
    eprintln!(
        "jobclust: ingested {} postings ({} duplicates, {} rejected)",
        report.inserted, report.duplicates, report.rejected
    );
    Ok(())
}
