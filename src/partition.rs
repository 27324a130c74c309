//! KMeans partition over TF-IDF rows.
//!
//! Fitting is delegated to `linfa_clustering::KMeans` (k-means++ seeding,
//! best of `n_init` runs) over the densified rows, seeded so a corpus always
//! yields the same centroids. Only the centroids are kept; prediction is a
//! nearest-centroid lookup through `linfa_nn`.

use crate::JobclustError;
use crate::vectorize::SparseVector;
use linfa::DatasetBase;
use linfa::traits::Fit;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use linfa_nn::{LinearSearch, NearestNeighbour};
use ndarray::{Array2, ArrayView1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionParams {
    pub k: usize,
    pub seed: u64,
    pub n_init: usize,
    pub max_iter: usize,
    /// Convergence tolerance passed to the KMeans fit.
    pub tol: f64,
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            k: 8,
            seed: 42,
            n_init: 4,
            max_iter: 300,
            tol: 1e-4,
        }
    }
}

/// Fitted centroids. Immutable once fitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredPartition", into = "StoredPartition")]
pub struct KMeansModel {
    k: usize,
    dim: usize,
    centroids: Array2<f64>,
    inertia: f64,
}

/// On-disk form: centroids as plain rows.
#[derive(Serialize, Deserialize)]
struct StoredPartition {
    k: usize,
    dim: usize,
    centroids: Vec<Vec<f64>>,
    inertia: f64,
}

impl TryFrom<StoredPartition> for KMeansModel {
    type Error = String;

    fn try_from(s: StoredPartition) -> Result<Self, Self::Error> {
        if s.centroids.len() != s.k || s.centroids.iter().any(|c| c.len() != s.dim) {
            return Err(format!("centroids do not form a {}x{} matrix", s.k, s.dim));
        }
        let flat: Vec<f64> = s.centroids.into_iter().flatten().collect();
        let centroids = Array2::from_shape_vec((s.k, s.dim), flat)
            .map_err(|e| format!("failed to restore centroids: {e}"))?;
        Ok(Self {
            k: s.k,
            dim: s.dim,
            centroids,
            inertia: s.inertia,
        })
    }
}

impl From<KMeansModel> for StoredPartition {
    fn from(m: KMeansModel) -> Self {
        Self {
            k: m.k,
            dim: m.dim,
            centroids: m.centroids.rows().into_iter().map(|r| r.to_vec()).collect(),
            inertia: m.inertia,
        }
    }
}

/// Stack sparse rows into a dense documents x terms matrix.
fn to_dense(rows: &[SparseVector], dim: usize) -> Array2<f64> {
    let mut dense = Array2::zeros((rows.len(), dim));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter() {
            dense[[i, j]] = v;
        }
    }
    dense
}

fn distinct_rows(rows: &[SparseVector]) -> usize {
    rows.iter()
        .map(|r| r.iter().map(|(i, v)| (i, v.to_bits())).collect::<Vec<_>>())
        .collect::<HashSet<_>>()
        .len()
}

impl KMeansModel {
    /// Fit K centroids. Degenerate input fails instead of producing a trivial partition.
    pub fn fit(rows: &[SparseVector], params: &PartitionParams) -> Result<Self, JobclustError> {
        let k = params.k;
        if k == 0 {
            return Err(JobclustError::Config("k must be at least 1".into()));
        }
        if rows.len() < k {
            return Err(JobclustError::Model(format!(
                "cannot partition {} documents into {k} clusters",
                rows.len()
            )));
        }
        let dim = rows[0].dim();
        if dim == 0 {
            return Err(JobclustError::Model("vector space has no dimensions".into()));
        }
        if rows.iter().any(|r| r.dim() != dim) {
            return Err(JobclustError::Model("rows have mixed dimensions".into()));
        }
        let distinct = distinct_rows(rows);
        if distinct < k {
            return Err(JobclustError::Model(format!(
                "only {distinct} distinct documents for {k} clusters"
            )));
        }

        let dataset = DatasetBase::from(to_dense(rows, dim));
        let model = KMeans::params_with_rng(k, StdRng::seed_from_u64(params.seed))
            .n_runs(params.n_init.max(1))
            .max_n_iterations(params.max_iter as u64)
            .tolerance(params.tol)
            .fit(&dataset)
            .map_err(|e| JobclustError::Model(format!("kmeans (k={k}): {e}")))?;

        log::debug!("kmeans k={k}: inertia {:.6}", model.inertia());
        Ok(Self {
            k,
            dim,
            centroids: model.centroids().clone(),
            inertia: model.inertia(),
        })
    }

    /// Nearest centroid id in `[0, k)`.
    pub fn predict(&self, row: &SparseVector) -> Result<usize, JobclustError> {
        if row.dim() != self.dim {
            return Err(JobclustError::Model(format!(
                "vector has dimension {}, partition expects {}",
                row.dim(),
                self.dim
            )));
        }
        let query = row.to_dense();
        let index = LinearSearch::new()
            .from_batch(&self.centroids, L2Dist)
            .map_err(|e| JobclustError::Model(format!("centroid index: {e}")))?;
        let nearest = index
            .k_nearest(query.view(), 1)
            .map_err(|e| JobclustError::Model(format!("nearest centroid: {e}")))?;
        nearest
            .first()
            .map(|&(_, idx)| idx)
            .ok_or_else(|| JobclustError::Model("no centroid found".into()))
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    pub fn centroid(&self, cluster_id: usize) -> Option<ArrayView1<'_, f64>> {
        (cluster_id < self.k).then(|| self.centroids.row(cluster_id))
    }

    pub fn inertia(&self) -> f64 {
        self.inertia
    }
}
