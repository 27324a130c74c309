//! Persistence for the fitted (vectorizer, partition) pair.
//!
//! One artifact per K holds both models, so a reader can never see a
//! vectorizer from one training run next to a partition from another. Each
//! saved pair carries a generation fingerprint that label registries are
//! bound to.

use crate::JobclustError;
use crate::partition::KMeansModel;
use crate::vectorize::TfidfVectorizer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The active models for one K.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPair {
    pub k: usize,
    pub generation: String,
    pub trained_at: i64,
    pub n_documents: usize,
    pub vectorizer: TfidfVectorizer,
    pub partition: KMeansModel,
}

pub trait ModelStore {
    /// `Ok(None)` when nothing has been trained for `k`.
    fn load(&self, k: usize) -> Result<Option<ModelPair>, JobclustError>;

    /// Persist a freshly fitted pair, replacing any previous pair for `k`.
    fn save(
        &self,
        k: usize,
        n_documents: usize,
        vectorizer: TfidfVectorizer,
        partition: KMeansModel,
    ) -> Result<ModelPair, JobclustError>;
}

/// Compute a SipHash fingerprint of raw bytes, returned as 16-char hex string.
pub(crate) fn siphash_hex(data: &[u8]) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::hash::DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Generation of a pair: fingerprint of both serialized models together.
pub fn generation_of(vectorizer: &TfidfVectorizer, partition: &KMeansModel) -> Result<String, JobclustError> {
    let bytes = serde_json::to_vec(&(vectorizer, partition))?;
    Ok(siphash_hex(&bytes))
}

/// Directory of `k{K}.model.json` files.
pub struct FileModelStore {
    dir: PathBuf,
}

impl FileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, k: usize) -> PathBuf {
        self.dir.join(format!("k{k}.model.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Write via a sibling temp file and rename, so the target is replaced whole.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), JobclustError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl ModelStore for FileModelStore {
    fn load(&self, k: usize) -> Result<Option<ModelPair>, JobclustError> {
        let path = self.path_for(k);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&path)?;
        let pair: ModelPair = serde_json::from_slice(&raw)?;

        if pair.k != k {
            return Err(JobclustError::Config(format!(
                "{} holds a model for k={}, requested k={k}",
                path.display(),
                pair.k
            )));
        }
        if pair.partition.k() != k || pair.partition.dim() != pair.vectorizer.dim() {
            return Err(JobclustError::Model(format!(
                "{}: partition (k={}, dim={}) does not fit vectorizer (dim={})",
                path.display(),
                pair.partition.k(),
                pair.partition.dim(),
                pair.vectorizer.dim()
            )));
        }

        log::debug!(
            "loaded model k={k} generation {} ({} terms) from {}",
            pair.generation,
            pair.vectorizer.dim(),
            path.display()
        );
        Ok(Some(pair))
    }

    fn save(
        &self,
        k: usize,
        n_documents: usize,
        vectorizer: TfidfVectorizer,
        partition: KMeansModel,
    ) -> Result<ModelPair, JobclustError> {
        if partition.k() != k {
            return Err(JobclustError::Config(format!(
                "refusing to store a k={} partition under k={k}",
                partition.k()
            )));
        }
        let generation = generation_of(&vectorizer, &partition)?;
        let pair = ModelPair {
            k,
            generation,
            trained_at: crate::now_secs(),
            n_documents,
            vectorizer,
            partition,
        };

        let path = self.path_for(k);
        if path.exists() {
            log::warn!(
                "overwriting model for k={k} at {}; cluster ids of the previous generation are no longer valid",
                path.display()
            );
        }
        write_atomic(&path, &serde_json::to_vec(&pair)?)?;
        log::info!("saved model k={k} generation {} to {}", pair.generation, path.display());
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionParams;
    use crate::vectorize::{DfBound, VectorizerParams};

    fn fitted(k: usize) -> (TfidfVectorizer, KMeansModel) {
        let docs = ["python sql", "python sql", "java spring", "tableau bi"];
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
        let rows = v.transform_all(&docs);
        let m = KMeansModel::fit(&rows, &PartitionParams { k, ..Default::default() }).unwrap();
        (v, m)
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileModelStore::new(dir.path());
        assert!(store.load(3).unwrap().is_none());
    }

    #[test]
    fn save_then_load_keeps_generation_and_predictions() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileModelStore::new(dir.path().join("models"));
        let (v, m) = fitted(2);
        let saved = store.save(2, 4, v, m).unwrap();
        assert_eq!(saved.generation.len(), 16);

        let loaded = store.load(2).unwrap().unwrap();
        assert_eq!(loaded.generation, saved.generation);
        assert_eq!(loaded.n_documents, 4);
        let row = loaded.vectorizer.transform("java spring");
        assert_eq!(
            loaded.partition.predict(&row).unwrap(),
            saved.partition.predict(&saved.vectorizer.transform("java spring")).unwrap()
        );
        assert!(!dir.path().join("models/k2.model.json.tmp").exists());
    }

    #[test]
    fn stores_are_keyed_by_k() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileModelStore::new(dir.path());
        let (v, m) = fitted(2);
        store.save(2, 4, v, m).unwrap();
        assert!(store.load(3).unwrap().is_none());
    }

    #[test]
    fn mismatched_k_on_disk_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileModelStore::new(dir.path());
        let (v, m) = fitted(2);
        store.save(2, 4, v, m).unwrap();
        std::fs::copy(store.path_for(2), store.path_for(3)).unwrap();
        assert!(matches!(store.load(3), Err(JobclustError::Config(_))));
    }

    #[test]
    fn save_rejects_wrong_k() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileModelStore::new(dir.path());
        let (v, m) = fitted(2);
        assert!(store.save(3, 4, v, m).is_err());
    }

    #[test]
    fn different_fits_have_different_generations() {
        let (v2, m2) = fitted(2);
        let (v3, m3) = fitted(3);
        assert_ne!(generation_of(&v2, &m2).unwrap(), generation_of(&v3, &m3).unwrap());
    }
}
