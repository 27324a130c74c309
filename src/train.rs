//! Batch trainer: full refit of the vector space and partition over the corpus.
//!
//! A rare, explicit operation. Every successful run replaces the stored pair
//! for its K and invalidates label registries bound to the previous
//! generation.

use crate::JobclustError;
use crate::cli::TrainArgs;
use crate::config::{PipelineSettings, load_config_from, resolve_settings};
use crate::db::{open_db_existing, record_training_run};
use crate::documents::{DocumentStore, SqliteDocuments, decode_text};
use crate::model_store::{FileModelStore, ModelPair, ModelStore};
use crate::normalize::clean_text;
use crate::partition::KMeansModel;
use crate::vectorize::TfidfVectorizer;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct TrainReport {
    pub pair: ModelPair,
    /// Documents the models were fitted on.
    pub n_documents: usize,
    /// Documents whose text cleaned down to nothing.
    pub n_empty: usize,
    pub n_undecodable: usize,
}

impl TrainReport {
    pub fn vocab_size(&self) -> usize {
        self.pair.vectorizer.dim()
    }

    pub fn inertia(&self) -> f64 {
        self.pair.partition.inertia()
    }
}

/// Fit and persist a fresh pair for `settings.partition.k`.
pub fn train_models(
    docs: &dyn DocumentStore,
    models: &dyn ModelStore,
    settings: &PipelineSettings,
) -> Result<TrainReport, JobclustError> {
    let raw = docs.fetch_training_texts()?;

    let mut corpus = Vec::with_capacity(raw.len());
    let mut n_empty = 0;
    let mut n_undecodable = 0;
    for doc in &raw {
        let Some(bytes) = doc.raw_text.as_deref() else {
            n_empty += 1;
            continue;
        };
        let Some(text) = decode_text(bytes) else {
            log::warn!("training: document {} is not valid UTF-8, excluded", doc.id);
            n_undecodable += 1;
            continue;
        };
        let clean = clean_text(Some(&text));
        if clean.is_empty() {
            n_empty += 1;
            continue;
        }
        corpus.push(clean.text);
    }

    let k = settings.partition.k;
    if corpus.len() < k {
        return Err(JobclustError::Model(format!(
            "training corpus has {} usable documents, need at least k={k}",
            corpus.len()
        )));
    }

    log::info!(
        "training k={k} on {} documents ({n_empty} empty, {n_undecodable} undecodable excluded)",
        corpus.len()
    );
    let vectorizer = TfidfVectorizer::fit(&corpus, settings.vectorizer.clone())?;
    let rows = vectorizer.transform_all(&corpus);
    let partition = KMeansModel::fit(&rows, &settings.partition)?;
    log::info!(
        "fitted {} terms, inertia {:.4}",
        vectorizer.dim(),
        partition.inertia()
    );

    let n_documents = corpus.len();
    let pair = models.save(k, n_documents, vectorizer, partition)?;
    log::warn!(
        "model k={k} is now generation {}; regenerate the label registry (`jobclust labels suggest` or `labels import`)",
        pair.generation
    );

    Ok(TrainReport {
        pair,
        n_documents,
        n_empty,
        n_undecodable,
    })
}

pub fn handle_train(db_path: &Path, config_path: Option<&Path>, args: &TrainArgs) -> Result<(), JobclustError> {
    let conn = open_db_existing(db_path)?;
    let config = load_config_from(config_path)?;
    let settings = resolve_settings(&config, args.k, None, false);

    let docs = SqliteDocuments::new(conn);
    let store = FileModelStore::new(&settings.models_dir);
    let report = train_models(&docs, &store, &settings)?;

    let run_id = record_training_run(
        docs.conn(),
        report.pair.k,
        &report.pair.generation,
        report.n_documents,
        report.vocab_size(),
        report.inertia(),
    )?;

    eprintln!(
        "jobclust: trained k={} on {} documents ({} terms, inertia {:.4})",
        report.pair.k,
        report.n_documents,
        report.vocab_size(),
        report.inertia()
    );
    eprintln!(
        "jobclust: training run #{run_id}, generation {} saved to {}",
        report.pair.generation,
        store.path_for(report.pair.k).display()
    );
    eprintln!("jobclust: label registries for earlier generations are now invalid");
    Ok(())
}
