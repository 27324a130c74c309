use crate::JobclustError;
use crate::partition::PartitionParams;
use crate::vectorize::{DfBound, VectorizerParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
pub struct JobclustConfig {
    #[serde(default)]
    pub vectorizer: VectorizerConfig,
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub assign: AssignConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct VectorizerConfig {
    /// 0 disables the cap.
    pub max_features: Option<usize>,
    pub min_df: Option<DfBound>,
    pub max_df: Option<DfBound>,
    pub ngram_range: Option<[usize; 2]>,
    pub sublinear_tf: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartitionConfig {
    pub k: Option<usize>,
    pub seed: Option<u64>,
    pub n_init: Option<usize>,
    pub max_iter: Option<usize>,
    pub tol: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AssignConfig {
    pub batch_limit: Option<usize>,
    #[serde(default)]
    pub retrain_if_missing: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct StoreConfig {
    pub models_dir: Option<PathBuf>,
}

/// Everything one pipeline run needs, after merging config file and CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub vectorizer: VectorizerParams,
    pub partition: PartitionParams,
    pub batch_limit: Option<usize>,
    pub retrain_if_missing: bool,
    pub models_dir: PathBuf,
}

pub fn jobclust_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".jobclust")
}

fn config_path() -> PathBuf {
    jobclust_dir().join("config.toml")
}

/// Load config from an explicit path (must exist), else ~/.jobclust/config.toml, else defaults.
pub fn load_config_from(explicit: Option<&Path>) -> Result<JobclustConfig, JobclustError> {
    let path = match explicit {
        Some(p) if !p.exists() => {
            return Err(JobclustError::Config(format!(
                "config file not found: {}",
                p.display()
            )));
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };
    if !path.exists() {
        return Ok(JobclustConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config: JobclustConfig = toml::from_str(&content)
        .map_err(|e| JobclustError::Config(format!("{}: {e}", path.display())))?;
    validate_config(&config)?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}

fn validate_bound(name: &str, bound: Option<DfBound>) -> Result<(), JobclustError> {
    if let Some(DfBound::Ratio(r)) = bound
        && !(r > 0.0 && r <= 1.0)
    {
        return Err(JobclustError::Config(format!(
            "vectorizer.{name} ratio must be in (0, 1], got {r}"
        )));
    }
    Ok(())
}

fn validate_config(config: &JobclustConfig) -> Result<(), JobclustError> {
    if config.partition.k == Some(0) {
        return Err(JobclustError::Config("partition.k must be at least 1".into()));
    }
    if config.partition.n_init == Some(0) {
        return Err(JobclustError::Config("partition.n_init must be at least 1".into()));
    }
    if config.partition.max_iter == Some(0) {
        return Err(JobclustError::Config("partition.max_iter must be at least 1".into()));
    }
    if let Some(tol) = config.partition.tol
        && !(tol >= 0.0)
    {
        return Err(JobclustError::Config(format!("partition.tol must be >= 0, got {tol}")));
    }
    if let Some([lo, hi]) = config.vectorizer.ngram_range
        && (lo == 0 || lo > hi)
    {
        return Err(JobclustError::Config(format!(
            "vectorizer.ngram_range [{lo}, {hi}] must satisfy 1 <= lo <= hi"
        )));
    }
    validate_bound("min_df", config.vectorizer.min_df)?;
    validate_bound("max_df", config.vectorizer.max_df)?;
    Ok(())
}

/// Merge config file values with CLI overrides. Flags win; the retrain flag can only enable.
pub fn resolve_settings(
    config: &JobclustConfig,
    k: Option<usize>,
    batch_limit: Option<usize>,
    retrain_if_missing: bool,
) -> PipelineSettings {
    let vd = VectorizerParams::default();
    let pd = PartitionParams::default();
    let v = &config.vectorizer;
    let p = &config.partition;

    let max_features = match v.max_features {
        Some(0) => None,
        Some(n) => Some(n),
        None => vd.max_features,
    };

    PipelineSettings {
        vectorizer: VectorizerParams {
            max_features,
            min_df: v.min_df.unwrap_or(vd.min_df),
            max_df: v.max_df.unwrap_or(vd.max_df),
            ngram_range: v.ngram_range.unwrap_or(vd.ngram_range),
            sublinear_tf: v.sublinear_tf.unwrap_or(vd.sublinear_tf),
        },
        partition: PartitionParams {
            k: k.or(p.k).unwrap_or(pd.k),
            seed: p.seed.unwrap_or(pd.seed),
            n_init: p.n_init.unwrap_or(pd.n_init),
            max_iter: p.max_iter.unwrap_or(pd.max_iter),
            tol: p.tol.unwrap_or(pd.tol),
        },
        batch_limit: batch_limit.or(config.assign.batch_limit).filter(|&n| n > 0),
        retrain_if_missing: retrain_if_missing || config.assign.retrain_if_missing,
        models_dir: config
            .store
            .models_dir
            .clone()
            .unwrap_or_else(|| jobclust_dir().join("models")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_when_no_file() {
        let config = JobclustConfig::default();
        let s = resolve_settings(&config, None, None, false);
        assert_eq!(s.partition.k, 8);
        assert_eq!(s.vectorizer, VectorizerParams::default());
        assert_eq!(s.batch_limit, None);
        assert!(!s.retrain_if_missing);
        assert!(s.models_dir.ends_with(".jobclust/models"));
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[vectorizer]
max_features = 2000
min_df = 3
max_df = 0.8
ngram_range = [1, 1]
sublinear_tf = true

[partition]
k = 12
seed = 7
n_init = 2
max_iter = 100
tol = 0.001

[assign]
batch_limit = 500
retrain_if_missing = true

[store]
models_dir = "/var/lib/jobclust/models"
"#;
        let config: JobclustConfig = toml::from_str(toml_str).unwrap();
        validate_config(&config).unwrap();
        let s = resolve_settings(&config, None, None, false);
        assert_eq!(s.vectorizer.max_features, Some(2000));
        assert_eq!(s.vectorizer.min_df, DfBound::Count(3));
        assert_eq!(s.vectorizer.max_df, DfBound::Ratio(0.8));
        assert_eq!(s.vectorizer.ngram_range, [1, 1]);
        assert!(s.vectorizer.sublinear_tf);
        assert_eq!(s.partition.k, 12);
        assert_eq!(s.partition.seed, 7);
        assert_eq!(s.batch_limit, Some(500));
        assert!(s.retrain_if_missing);
        assert_eq!(s.models_dir, PathBuf::from("/var/lib/jobclust/models"));
    }

    #[test]
    fn cli_overrides_win() {
        let config: JobclustConfig = toml::from_str(
            r#"
[partition]
k = 12
[assign]
batch_limit = 500
"#,
        )
        .unwrap();
        let s = resolve_settings(&config, Some(3), Some(10), true);
        assert_eq!(s.partition.k, 3);
        assert_eq!(s.batch_limit, Some(10));
        assert!(s.retrain_if_missing);
    }

    #[test]
    fn zero_max_features_means_uncapped() {
        let config: JobclustConfig = toml::from_str("[vectorizer]\nmax_features = 0\n").unwrap();
        assert_eq!(resolve_settings(&config, None, None, false).vectorizer.max_features, None);
    }

    #[test]
    fn zero_k_rejected() {
        let config: JobclustConfig = toml::from_str("[partition]\nk = 0\n").unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn bad_ngram_range_rejected() {
        let config: JobclustConfig = toml::from_str("[vectorizer]\nngram_range = [2, 1]\n").unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn ratio_out_of_range_rejected() {
        let config: JobclustConfig = toml::from_str("[vectorizer]\nmax_df = 1.5\n").unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn explicit_missing_config_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_config_from(Some(&dir.path().join("absent.toml")));
        assert!(matches!(err, Err(JobclustError::Config(_))));
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[partition]\nk = 5\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.partition.k, Some(5));
    }
}
