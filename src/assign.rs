//! Incremental assignment engine.
//!
//! Each unprocessed document moves Unprocessed -> Cleaned -> Vectorized ->
//! Assigned -> Persisted against an already fitted model pair. Nothing is
//! re-clustered; documents that already carry `processed_at` are never read
//! again. A document that fails mid-way is reported and left Unprocessed; its
//! failed attempts queue it behind fresh documents on later runs.

use crate::JobclustError;
use crate::cli::AssignArgs;
use crate::config::{PipelineSettings, load_config_from, resolve_settings};
use crate::db::{open_db_existing, record_training_run};
use crate::documents::{Assignment, DocumentStore, RawDocument, SqliteDocuments, decode_text};
use crate::labeling::derive_registry;
use crate::labels::LabelRegistry;
use crate::model_store::{FileModelStore, ModelPair, ModelStore};
use crate::normalize::clean_text;
use crate::train::train_models;
use crate::vectorize::is_finite;
use std::collections::BTreeMap;
use std::path::Path;

/// Terms the heuristic labeler uses when a bootstrap fills an empty registry.
const BOOTSTRAP_LABEL_TERMS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unprocessed,
    Cleaned,
    Vectorized,
    Assigned,
    Persisted,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Unprocessed => "unprocessed",
            Stage::Cleaned => "cleaned",
            Stage::Vectorized => "vectorized",
            Stage::Assigned => "assigned",
            Stage::Persisted => "persisted",
        };
        f.write_str(s)
    }
}

/// A document that could not move forward, with the last stage it reached.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDocument {
    pub id: String,
    pub stage: Stage,
    pub reason: String,
}

/// What happened to one document in a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Assigned { cluster_id: usize, label: String },
    /// No usable tokens: persisted with null cluster id and label.
    Unclusterable,
    Skipped(SkippedDocument),
    /// Someone else processed it between fetch and write.
    AlreadyProcessed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignSummary {
    pub examined: usize,
    pub assigned: usize,
    pub unclusterable: usize,
    pub already_processed: usize,
    pub skipped: Vec<SkippedDocument>,
    pub per_cluster: BTreeMap<usize, usize>,
}

impl AssignSummary {
    /// Documents whose row was written this run.
    pub fn updated(&self) -> usize {
        self.assigned + self.unclusterable
    }

    fn record(&mut self, outcome: Outcome) {
        self.examined += 1;
        match outcome {
            Outcome::Assigned { cluster_id, .. } => {
                self.assigned += 1;
                *self.per_cluster.entry(cluster_id).or_insert(0) += 1;
            }
            Outcome::Unclusterable => self.unclusterable += 1,
            Outcome::AlreadyProcessed => self.already_processed += 1,
            Outcome::Skipped(s) => self.skipped.push(s),
        }
    }
}

/// Compute the assignment for one document without writing anything.
pub fn process_document(
    doc: &RawDocument,
    pair: &ModelPair,
    registry: &LabelRegistry,
    now: i64,
) -> Result<Assignment, SkippedDocument> {
    let skip = |stage: Stage, reason: String| SkippedDocument {
        id: doc.id.clone(),
        stage,
        reason,
    };

    let text = match doc.raw_text.as_deref() {
        None => None,
        Some(bytes) => Some(
            decode_text(bytes)
                .ok_or_else(|| skip(Stage::Unprocessed, "raw text is not valid UTF-8".into()))?,
        ),
    };

    // Unprocessed -> Cleaned
    let clean = clean_text(text.as_deref());
    if clean.is_empty() {
        return Ok(Assignment {
            clean_text: clean.text,
            n_tokens: 0,
            cluster_id: None,
            cluster_label: None,
            model_generation: Some(pair.generation.clone()),
            processed_at: now,
        });
    }

    // Cleaned -> Vectorized
    let vector = pair.vectorizer.transform(&clean.text);
    if !is_finite(&vector) {
        return Err(skip(Stage::Cleaned, "vector has non-finite weights".into()));
    }

    // Vectorized -> Assigned
    let cluster_id = pair
        .partition
        .predict(&vector)
        .map_err(|e| skip(Stage::Vectorized, e.to_string()))?;
    let label = registry.resolve(cluster_id).to_string();

    Ok(Assignment {
        clean_text: clean.text,
        n_tokens: clean.n_tokens,
        cluster_id: Some(cluster_id),
        cluster_label: Some(label),
        model_generation: Some(pair.generation.clone()),
        processed_at: now,
    })
}

/// Assign every unprocessed document (up to `limit`) and persist each one atomically.
///
/// Fails before touching any document if `registry` was not produced for
/// `pair`. Store errors abort the run; per-document problems only skip that
/// document.
pub fn run_assignment(
    docs: &dyn DocumentStore,
    pair: &ModelPair,
    registry: &LabelRegistry,
    limit: Option<usize>,
) -> Result<AssignSummary, JobclustError> {
    registry.ensure_matches(pair)?;

    let pending = docs.fetch_unprocessed(limit)?;
    let mut summary = AssignSummary::default();
    if pending.is_empty() {
        log::info!("no unprocessed documents");
        return Ok(summary);
    }
    log::info!(
        "assigning {} documents with model k={} generation {}",
        pending.len(),
        pair.k,
        pair.generation
    );

    for doc in &pending {
        let outcome = match process_document(doc, pair, registry, crate::now_secs()) {
            Err(skipped) => {
                log::warn!(
                    "skipping document {} (stopped at {}): {}",
                    skipped.id,
                    skipped.stage,
                    skipped.reason
                );
                docs.record_failure(&doc.id, &format!("{}: {}", skipped.stage, skipped.reason))?;
                Outcome::Skipped(skipped)
            }
            Ok(assignment) => {
                // Assigned -> Persisted
                if !docs.persist(&doc.id, &assignment)? {
                    log::debug!("document {} was already processed", doc.id);
                    Outcome::AlreadyProcessed
                } else {
                    match (assignment.cluster_id, assignment.cluster_label) {
                        (Some(cluster_id), Some(label)) => Outcome::Assigned { cluster_id, label },
                        _ => Outcome::Unclusterable,
                    }
                }
            }
        };
        summary.record(outcome);
    }

    Ok(summary)
}

/// Load the pair for `settings.partition.k`, training it once if allowed.
/// Returns the pair and whether it was trained by this call.
pub fn load_or_bootstrap(
    docs: &dyn DocumentStore,
    models: &dyn ModelStore,
    settings: &PipelineSettings,
) -> Result<(ModelPair, bool), JobclustError> {
    let k = settings.partition.k;
    if let Some(pair) = models.load(k)? {
        return Ok((pair, false));
    }
    if !settings.retrain_if_missing {
        return Err(JobclustError::Model(format!(
            "no model for k={k}; run `jobclust train` or pass --retrain-if-missing"
        )));
    }

    log::warn!("no model for k={k}; training one before assignment");
    let report = train_models(docs, models, settings)?;
    Ok((report.pair, true))
}

/// Registry to use with a pair trained by this run. Only an empty registry is
/// filled with heuristic labels; one with entries is never overwritten.
pub fn bootstrap_registry(
    registry: LabelRegistry,
    pair: &ModelPair,
    labels_path: &Path,
) -> Result<LabelRegistry, JobclustError> {
    if registry.ensure_matches(pair).is_ok() {
        return Ok(registry);
    }
    if !registry.clusters.is_empty() {
        return Err(JobclustError::Consistency(format!(
            "trained model k={} generation {}, but {} holds labels for k={} generation {}; \
             run `jobclust labels suggest` or `jobclust labels import` before assigning",
            pair.k,
            pair.generation,
            labels_path.display(),
            registry.k,
            registry.generation
        )));
    }

    let derived = derive_registry(pair, BOOTSTRAP_LABEL_TERMS);
    derived.save(labels_path)?;
    log::warn!(
        "bootstrapped model generation {}; wrote heuristic labels to the empty registry {}",
        pair.generation,
        labels_path.display()
    );
    Ok(derived)
}

pub fn handle_assign(db_path: &Path, config_path: Option<&Path>, args: &AssignArgs) -> Result<(), JobclustError> {
    // Required inputs are checked before anything is read or trained.
    if !db_path.exists() {
        return Err(JobclustError::Config(format!(
            "database not found: {}",
            db_path.display()
        )));
    }
    let mut registry = LabelRegistry::load(&args.labels)?;

    let config = load_config_from(config_path)?;
    let settings = resolve_settings(&config, args.k, args.limit, args.retrain_if_missing);
    let docs = SqliteDocuments::new(open_db_existing(db_path)?);
    let store = FileModelStore::new(&settings.models_dir);

    let (pair, trained) = load_or_bootstrap(&docs, &store, &settings)?;

    if trained {
        record_training_run(
            docs.conn(),
            pair.k,
            &pair.generation,
            pair.n_documents,
            pair.vectorizer.dim(),
            pair.partition.inertia(),
        )?;
        registry = bootstrap_registry(registry, &pair, &args.labels)?;
    }

    let summary = run_assignment(&docs, &pair, &registry, settings.batch_limit)?;

    if summary.examined == 0 {
        eprintln!("jobclust: no unprocessed documents");
        return Ok(());
    }
    eprintln!(
        "jobclust: updated {} documents ({} assigned, {} unclusterable), {} skipped",
        summary.updated(),
        summary.assigned,
        summary.unclusterable,
        summary.skipped.len()
    );
    for (cluster_id, count) in &summary.per_cluster {
        eprintln!(
            "jobclust:   cluster {cluster_id} ({}) +{count}",
            registry.resolve(*cluster_id)
        );
    }
    for s in &summary.skipped {
        eprintln!("jobclust:   skipped {} at {}: {}", s.id, s.stage, s.reason);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelEntry;
    use crate::model_store::generation_of;
    use crate::partition::{KMeansModel, PartitionParams};
    use crate::vectorize::{DfBound, TfidfVectorizer, VectorizerParams};

    fn pair() -> ModelPair {
        let docs = ["python sql", "python sql", "java spring"];
        let v = TfidfVectorizer::fit(
            &docs,
            VectorizerParams {
                max_features: None,
                min_df: DfBound::Count(1),
                max_df: DfBound::Ratio(1.0),
                ngram_range: [1, 2],
                sublinear_tf: false,
            },
        )
        .unwrap();
        let m = KMeansModel::fit(&v.transform_all(&docs), &PartitionParams { k: 2, ..Default::default() }).unwrap();
        ModelPair {
            k: 2,
            generation: generation_of(&v, &m).unwrap(),
            trained_at: 0,
            n_documents: 3,
            vectorizer: v,
            partition: m,
        }
    }

    #[test]
    fn empty_text_is_unclusterable_not_an_error() {
        let p = pair();
        let r = LabelRegistry::for_pair(&p);
        for raw in [None, Some(""), Some("le la les 42")] {
            let a = process_document(&RawDocument::new("d", raw), &p, &r, 7).unwrap();
            assert_eq!(a.cluster_id, None);
            assert_eq!(a.cluster_label, None);
            assert_eq!(a.n_tokens, 0);
            assert_eq!(a.processed_at, 7);
        }
    }

    #[test]
    fn assigns_cluster_and_resolves_label() {
        let p = pair();
        let python = p.partition.predict(&p.vectorizer.transform("python sql")).unwrap();
        let mut r = LabelRegistry::for_pair(&p);
        r.bulk_load([(python, LabelEntry::new("Data Engineer"))].into_iter().collect())
            .unwrap();

        let a = process_document(&RawDocument::new("d", Some("Python & SQL!")), &p, &r, 1).unwrap();
        assert_eq!(a.cluster_id, Some(python));
        assert_eq!(a.cluster_label.as_deref(), Some("Data Engineer"));
        assert_eq!(a.clean_text, "python sql");
        assert_eq!(a.model_generation.as_deref(), Some(p.generation.as_str()));

        let b = process_document(&RawDocument::new("e", Some("Java Spring")), &p, &r, 1).unwrap();
        assert_ne!(b.cluster_id, Some(python));
        assert_eq!(b.cluster_label.as_deref(), Some("Unknown"));
    }

    #[test]
    fn invalid_utf8_is_skipped_at_first_stage() {
        let p = pair();
        let r = LabelRegistry::for_pair(&p);
        let doc = RawDocument {
            id: "bad".into(),
            raw_text: Some(vec![0x70, 0xff, 0x79]),
        };
        let err = process_document(&doc, &p, &r, 1).unwrap_err();
        assert_eq!(err.id, "bad");
        assert_eq!(err.stage, Stage::Unprocessed);
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut s = AssignSummary::default();
        s.record(Outcome::Assigned { cluster_id: 1, label: "x".into() });
        s.record(Outcome::Assigned { cluster_id: 1, label: "x".into() });
        s.record(Outcome::Unclusterable);
        s.record(Outcome::AlreadyProcessed);
        s.record(Outcome::Skipped(SkippedDocument {
            id: "z".into(),
            stage: Stage::Unprocessed,
            reason: "bad".into(),
        }));
        assert_eq!(s.examined, 5);
        assert_eq!(s.updated(), 3);
        assert_eq!(s.per_cluster[&1], 2);
        assert_eq!(s.skipped.len(), 1);
    }
}
