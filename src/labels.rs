//! Label registry: cluster id -> human-readable label for one model generation.

use crate::JobclustError;
use crate::cli::{LabelsArgs, LabelsCommand};
use crate::config::{PipelineSettings, load_config_from, resolve_settings};
use crate::model_store::{FileModelStore, ModelPair, ModelStore, write_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Label for any cluster id without a registry entry.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_terms: Option<String>,
}

impl LabelEntry {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            top_terms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRegistry {
    pub k: usize,
    pub generation: String,
    #[serde(default)]
    pub clusters: BTreeMap<usize, LabelEntry>,
}

impl LabelRegistry {
    pub fn new(k: usize, generation: impl Into<String>) -> Self {
        Self {
            k,
            generation: generation.into(),
            clusters: BTreeMap::new(),
        }
    }

    /// Empty registry bound to `pair`.
    pub fn for_pair(pair: &ModelPair) -> Self {
        Self::new(pair.k, pair.generation.clone())
    }

    /// Registered label, or [`UNKNOWN_LABEL`]. Never fails.
    pub fn resolve(&self, cluster_id: usize) -> &str {
        self.clusters
            .get(&cluster_id)
            .map(|e| e.label.as_str())
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn top_terms(&self, cluster_id: usize) -> Option<&str> {
        self.clusters.get(&cluster_id)?.top_terms.as_deref()
    }

    /// Replace every entry. Ids outside `[0, k)` are rejected.
    pub fn bulk_load(&mut self, mapping: BTreeMap<usize, LabelEntry>) -> Result<(), JobclustError> {
        if let Some(id) = mapping.keys().find(|&&id| id >= self.k) {
            return Err(JobclustError::Config(format!(
                "label mapping has cluster id {id}, but k={}",
                self.k
            )));
        }
        self.clusters = mapping;
        Ok(())
    }

    /// Fail unless this registry was produced for exactly `pair`.
    pub fn ensure_matches(&self, pair: &ModelPair) -> Result<(), JobclustError> {
        if self.k != pair.k {
            return Err(JobclustError::Consistency(format!(
                "label registry is for k={}, model is k={}",
                self.k, pair.k
            )));
        }
        if self.generation != pair.generation {
            return Err(JobclustError::Consistency(format!(
                "label registry generation {} does not match model generation {}; regenerate labels after retraining",
                self.generation, pair.generation
            )));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, JobclustError> {
        if !path.exists() {
            return Err(JobclustError::Config(format!(
                "label registry not found: {}",
                path.display()
            )));
        }
        let raw = std::fs::read(path)?;
        let registry: Self = serde_json::from_slice(&raw)?;
        if let Some(id) = registry.clusters.keys().find(|&&id| id >= registry.k) {
            return Err(JobclustError::Config(format!(
                "{}: cluster id {id} is outside k={}",
                path.display(),
                registry.k
            )));
        }
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<(), JobclustError> {
        write_atomic(path, &serde_json::to_vec_pretty(self)?)
    }
}

/// Parse an externally produced mapping. Accepts `{"0": "Data Engineer"}`,
/// `{"0": {"label": .., "top_terms": ..}}`, or a full registry file (its
/// `clusters` are used, its binding is ignored).
pub fn parse_mapping(raw: &str) -> Result<BTreeMap<usize, LabelEntry>, JobclustError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let serde_json::Value::Object(mut map) = value else {
        return Err(JobclustError::Config(
            "label mapping must be a JSON object".into(),
        ));
    };
    let object = match map.remove("clusters") {
        Some(serde_json::Value::Object(clusters)) => clusters,
        Some(_) => {
            return Err(JobclustError::Config(
                "label mapping `clusters` must be an object".into(),
            ));
        }
        None => map,
    };

    let mut mapping = BTreeMap::new();
    for (key, v) in object {
        let id: usize = key
            .trim()
            .parse()
            .map_err(|_| JobclustError::Config(format!("label mapping key {key:?} is not a cluster id")))?;
        let entry = match v {
            serde_json::Value::String(label) => LabelEntry::new(label),
            obj @ serde_json::Value::Object(_) => serde_json::from_value(obj)?,
            other => {
                return Err(JobclustError::Config(format!(
                    "label for cluster {id} must be a string or object, got {other}"
                )));
            }
        };
        mapping.insert(id, entry);
    }
    Ok(mapping)
}

fn active_pair(settings: &PipelineSettings) -> Result<ModelPair, JobclustError> {
    let store = FileModelStore::new(&settings.models_dir);
    store.load(settings.partition.k)?.ok_or_else(|| {
        JobclustError::Model(format!(
            "no model for k={} in {}; run `jobclust train` first",
            settings.partition.k,
            settings.models_dir.display()
        ))
    })
}

pub fn handle_labels(config_path: Option<&Path>, args: &LabelsArgs) -> Result<(), JobclustError> {
    let config = load_config_from(config_path)?;

    match &args.command {
        LabelsCommand::Import(a) => {
            let settings = resolve_settings(&config, a.k, None, false);
            let raw = std::fs::read_to_string(&a.mapping).map_err(|e| {
                JobclustError::Config(format!("label mapping {}: {e}", a.mapping.display()))
            })?;
            let mapping = parse_mapping(&raw)?;
            let pair = active_pair(&settings)?;

            let mut registry = LabelRegistry::for_pair(&pair);
            registry.bulk_load(mapping)?;
            registry.save(&a.labels)?;
            eprintln!(
                "jobclust: installed {} labels for k={} generation {} at {}",
                registry.clusters.len(),
                registry.k,
                registry.generation,
                a.labels.display()
            );
        }
        LabelsCommand::Suggest(a) => {
            let settings = resolve_settings(&config, a.k, None, false);
            let pair = active_pair(&settings)?;
            let registry = crate::labeling::derive_registry(&pair, a.top_terms);
            registry.save(&a.labels)?;
            for (id, entry) in &registry.clusters {
                println!(
                    "{id}\t{}\t{}",
                    entry.label,
                    entry.top_terms.as_deref().unwrap_or("")
                );
            }
            eprintln!(
                "jobclust: wrote heuristic labels for k={} generation {} to {}",
                registry.k,
                registry.generation,
                a.labels.display()
            );
        }
        LabelsCommand::Show(a) => {
            let registry = LabelRegistry::load(&a.labels)?;
            println!("k={} generation={}", registry.k, registry.generation);
            for (id, entry) in &registry.clusters {
                println!("{id}\t{}\t{}", entry.label, entry.top_terms.as_deref().unwrap_or(""));
            }
            let unmapped = registry.k.saturating_sub(registry.clusters.len());
            if unmapped > 0 {
                println!("{unmapped} unmapped clusters resolve to {UNKNOWN_LABEL}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(k: usize, entries: &[(usize, &str)]) -> LabelRegistry {
        let mut r = LabelRegistry::new(k, "0123456789abcdef");
        r.bulk_load(
            entries
                .iter()
                .map(|&(id, l)| (id, LabelEntry::new(l)))
                .collect(),
        )
        .unwrap();
        r
    }

    #[test]
    fn unmapped_cluster_resolves_to_unknown() {
        let r = registry(3, &[(0, "Data Engineer")]);
        assert_eq!(r.resolve(0), "Data Engineer");
        assert_eq!(r.resolve(1), UNKNOWN_LABEL);
        assert_eq!(r.resolve(usize::MAX), UNKNOWN_LABEL);
    }

    #[test]
    fn bulk_load_replaces_entries() {
        let mut r = registry(3, &[(0, "Data Engineer"), (1, "BI/Analytics")]);
        r.bulk_load([(2, LabelEntry::new("DevOps"))].into_iter().collect())
            .unwrap();
        assert_eq!(r.resolve(0), UNKNOWN_LABEL);
        assert_eq!(r.resolve(2), "DevOps");
    }

    #[test]
    fn bulk_load_rejects_out_of_range_ids() {
        let mut r = LabelRegistry::new(2, "g");
        let err = r.bulk_load([(5, LabelEntry::new("x"))].into_iter().collect());
        assert!(matches!(err, Err(JobclustError::Config(_))));
    }

    #[test]
    fn parse_flat_mapping() {
        let m = parse_mapping(r#"{"0": "Data Engineer", "2": "BI/Analytics"}"#).unwrap();
        assert_eq!(m[&0].label, "Data Engineer");
        assert_eq!(m[&2].label, "BI/Analytics");
        assert!(m[&0].top_terms.is_none());
    }

    #[test]
    fn parse_entry_mapping_and_registry_file() {
        let m = parse_mapping(
            r#"{"k": 2, "generation": "old", "clusters": {"1": {"label": "Data Scientist", "top_terms": "ml, python"}}}"#,
        )
        .unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m[&1].top_terms.as_deref(), Some("ml, python"));
    }

    #[test]
    fn parse_rejects_non_numeric_keys() {
        assert!(parse_mapping(r#"{"zero": "x"}"#).is_err());
        assert!(parse_mapping(r#"["x"]"#).is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("labels.json");
        let r = registry(3, &[(0, "Data Engineer")]);
        r.save(&path).unwrap();
        assert_eq!(LabelRegistry::load(&path).unwrap(), r);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = LabelRegistry::load(&dir.path().join("nope.json"));
        assert!(matches!(err, Err(JobclustError::Config(_))));
    }

    #[test]
    fn load_rejects_ids_outside_k() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, r#"{"k": 2, "generation": "g", "clusters": {"7": {"label": "x"}}}"#).unwrap();
        assert!(matches!(LabelRegistry::load(&path), Err(JobclustError::Config(_))));
    }
}
