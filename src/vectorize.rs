//! TF-IDF vector space over cleaned job descriptions.
//!
//! Word n-grams over whitespace tokens, raw (or sublinear) term counts times
//! smoothed idf `ln((1 + n) / (1 + df)) + 1`, rows L2-normalized. Vocabulary
//! indices are alphabetical, so a fit is fully determined by its corpus and
//! parameters.

use crate::JobclustError;
use serde::{Deserialize, Serialize};
use sprs::CsVec;
use std::collections::HashMap;

/// Document-frequency bound: an absolute document count or a ratio of the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DfBound {
    Count(usize),
    Ratio(f64),
}

impl DfBound {
    /// Threshold expressed in documents for a corpus of `n_docs`.
    pub fn threshold(&self, n_docs: usize) -> f64 {
        match *self {
            DfBound::Count(c) => c as f64,
            DfBound::Ratio(r) => r * n_docs as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerParams {
    /// Keep only the most frequent terms (by corpus term count).
    pub max_features: Option<usize>,
    pub min_df: DfBound,
    pub max_df: DfBound,
    pub ngram_range: [usize; 2],
    #[serde(default)]
    pub sublinear_tf: bool,
}

impl Default for VectorizerParams {
    fn default() -> Self {
        Self {
            max_features: Some(5000),
            min_df: DfBound::Count(2),
            max_df: DfBound::Ratio(0.95),
            ngram_range: [1, 2],
            sublinear_tf: false,
        }
    }
}

/// Row in the fitted space: L2-normalized weights, indices sorted.
pub type SparseVector = CsVec<f64>;

/// True when no weight is NaN or infinite.
pub fn is_finite(row: &SparseVector) -> bool {
    row.data().iter().all(|v| v.is_finite())
}

/// Fitted TF-IDF transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StoredVectorizer", into = "StoredVectorizer")]
pub struct TfidfVectorizer {
    params: VectorizerParams,
    terms: Vec<String>,
    idf: Vec<f64>,
    index: HashMap<String, usize>,
}

/// On-disk form: the term index is rebuilt on load.
#[derive(Serialize, Deserialize)]
struct StoredVectorizer {
    params: VectorizerParams,
    terms: Vec<String>,
    idf: Vec<f64>,
}

impl From<StoredVectorizer> for TfidfVectorizer {
    fn from(s: StoredVectorizer) -> Self {
        let index = build_index(&s.terms);
        Self {
            params: s.params,
            terms: s.terms,
            idf: s.idf,
            index,
        }
    }
}

impl From<TfidfVectorizer> for StoredVectorizer {
    fn from(v: TfidfVectorizer) -> Self {
        Self {
            params: v.params,
            terms: v.terms,
            idf: v.idf,
        }
    }
}

fn build_index(terms: &[String]) -> HashMap<String, usize> {
    terms
        .iter()
        .enumerate()
        .map(|(i, t)| (t.clone(), i))
        .collect()
}

/// Count word n-grams of a cleaned, whitespace-tokenized text.
pub(crate) fn word_ngrams(text: &str, lo: usize, hi: usize) -> HashMap<String, u32> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut ngrams = HashMap::new();

    for n in lo..=hi {
        if n == 0 || n > tokens.len() {
            continue;
        }
        for window in tokens.windows(n) {
            *ngrams.entry(window.join(" ")).or_insert(0) += 1;
        }
    }

    ngrams
}

impl TfidfVectorizer {
    /// Fit over cleaned, non-empty documents.
    pub fn fit<S: AsRef<str>>(docs: &[S], params: VectorizerParams) -> Result<Self, JobclustError> {
        let n_docs = docs.len();
        if n_docs == 0 {
            return Err(JobclustError::Model(
                "cannot fit vectorizer on an empty corpus".into(),
            ));
        }
        let [lo, hi] = params.ngram_range;
        if lo == 0 || lo > hi {
            return Err(JobclustError::Config(format!(
                "invalid ngram_range [{lo}, {hi}]"
            )));
        }

        let mut df: HashMap<String, usize> = HashMap::new();
        let mut tf_total: HashMap<String, u64> = HashMap::new();
        for doc in docs {
            let grams = word_ngrams(doc.as_ref(), lo, hi);
            for (gram, count) in grams {
                *tf_total.entry(gram.clone()).or_insert(0) += count as u64;
                *df.entry(gram).or_insert(0) += 1;
            }
        }

        let min_count = params.min_df.threshold(n_docs);
        let max_count = params.max_df.threshold(n_docs);
        if max_count < min_count {
            return Err(JobclustError::Config(format!(
                "max_df ({max_count:.1} docs) is below min_df ({min_count:.1} docs)"
            )));
        }

        let mut kept: Vec<(String, u64)> = df
            .iter()
            .filter(|&(_, &d)| d as f64 >= min_count && d as f64 <= max_count)
            .map(|(term, _)| (term.clone(), tf_total[term]))
            .collect();

        if let Some(cap) = params.max_features
            && kept.len() > cap
        {
            kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            kept.truncate(cap);
        }

        let mut terms: Vec<String> = kept.into_iter().map(|(t, _)| t).collect();
        terms.sort();

        if terms.is_empty() {
            return Err(JobclustError::Model(format!(
                "empty vocabulary: no term of {n_docs} documents survives min_df/max_df bounds"
            )));
        }

        let idf = terms
            .iter()
            .map(|t| ((1.0 + n_docs as f64) / (1.0 + df[t] as f64)).ln() + 1.0)
            .collect();

        let index = build_index(&terms);
        Ok(Self {
            params,
            terms,
            idf,
            index,
        })
    }

    /// Map cleaned text into the fitted space. Unknown terms contribute nothing.
    pub fn transform(&self, clean: &str) -> SparseVector {
        let [lo, hi] = self.params.ngram_range;
        let grams = word_ngrams(clean, lo, hi);

        let mut entries: Vec<(usize, f64)> = grams
            .iter()
            .filter_map(|(gram, &count)| {
                let &idx = self.index.get(gram)?;
                let tf = if self.params.sublinear_tf {
                    1.0 + (count as f64).ln()
                } else {
                    count as f64
                };
                Some((idx, tf * self.idf[idx]))
            })
            .collect();
        entries.sort_by_key(|&(i, _)| i);

        let norm = entries.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in entries.iter_mut() {
                *v /= norm;
            }
        }

        let (indices, data): (Vec<usize>, Vec<f64>) = entries.into_iter().unzip();
        CsVec::new(self.terms.len(), indices, data)
    }

    pub fn transform_all<S: AsRef<str>>(&self, docs: &[S]) -> Vec<SparseVector> {
        docs.iter().map(|d| self.transform(d.as_ref())).collect()
    }

    pub fn dim(&self) -> usize {
        self.terms.len()
    }

    pub fn term(&self, idx: usize) -> Option<&str> {
        self.terms.get(idx).map(String::as_str)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn params(&self) -> &VectorizerParams {
        &self.params
    }
}
