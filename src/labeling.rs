//! Heuristic cluster labeling from centroid top terms.
//!
//! Best-effort: each cluster's strongest terms are scored against keyword
//! rules for common data and software job families. Labels may repeat across
//! clusters; clusters matching no rule get [`MIXED_LABEL`]. Operators are
//! expected to review the result (`labels show`) or replace it with a curated
//! mapping (`labels import`).

use crate::labels::{LabelEntry, LabelRegistry};
use crate::model_store::ModelPair;

pub const MIXED_LABEL: &str = "Other/Mixed";

/// Keywords are matched against cleaned (lowercase, accent-folded) terms.
const RULES: &[(&str, &[&str])] = &[
    (
        "Data Engineer",
        &[
            "data engineer", "spark", "airflow", "etl", "kafka", "pipeline", "pipelines",
            "hadoop", "databricks", "dbt", "snowflake", "bigquery", "scala", "ingestion",
        ],
    ),
    (
        "Data Scientist",
        &[
            "data scientist", "machine learning", "deep learning", "scikit", "tensorflow",
            "pytorch", "modelisation", "statistique", "statistiques", "statistics", "nlp",
            "algorithmes", "prediction",
        ],
    ),
    (
        "BI/Analytics",
        &[
            "power bi", "powerbi", "tableau", "dashboard", "dashboards", "reporting", "looker",
            "qlik", "business intelligence", "kpi", "analytics", "indicateurs",
        ],
    ),
    (
        "Data Analyst",
        &["data analyst", "analyst", "analyste", "excel", "analyse", "analyses", "vba"],
    ),
    (
        "ML Engineer / MLOps",
        &["mlops", "ml engineer", "mlflow", "kubeflow", "model deployment", "inference"],
    ),
    (
        "DevOps / Cloud",
        &[
            "devops", "aws", "azure", "gcp", "terraform", "kubernetes", "docker", "ansible",
            "cloud", "ci cd",
        ],
    ),
    (
        "Software Engineer",
        &[
            "java", "spring", "backend", "frontend", "javascript", "typescript", "react",
            "developpeur", "developer", "api", "microservices", "c++", "c#",
        ],
    ),
    (
        "Data Governance",
        &[
            "gouvernance", "governance", "data quality", "qualite", "rgpd", "gdpr", "catalog",
            "catalogue", "metadata", "data steward",
        ],
    ),
];

/// Strongest `n` centroid terms of one cluster, highest weight first.
pub fn top_terms(pair: &ModelPair, cluster_id: usize, n: usize) -> Vec<(String, f64)> {
    let Some(centroid) = pair.partition.centroid(cluster_id) else {
        return Vec::new();
    };
    let mut weighted: Vec<(usize, f64)> = centroid
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, w)| w > 0.0)
        .collect();
    weighted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    weighted
        .into_iter()
        .take(n)
        .filter_map(|(i, w)| pair.vectorizer.term(i).map(|t| (t.to_string(), w)))
        .collect()
}

fn term_matches(term: &str, keyword: &str) -> bool {
    term == keyword || (!keyword.contains(' ') && term.split(' ').any(|t| t == keyword))
}

/// Best rule for a set of weighted terms, or [`MIXED_LABEL`].
pub fn suggest_label(terms: &[(String, f64)]) -> &'static str {
    let mut best: (&'static str, f64) = (MIXED_LABEL, 0.0);
    for &(label, keywords) in RULES {
        let score: f64 = terms
            .iter()
            .filter(|(term, _)| keywords.iter().any(|kw| term_matches(term, kw)))
            .map(|(_, w)| w)
            .sum();
        if score > best.1 {
            best = (label, score);
        }
    }
    best.0
}

/// Label every cluster of `pair` and bind the result to its generation.
pub fn derive_registry(pair: &ModelPair, n_terms: usize) -> LabelRegistry {
    let mut registry = LabelRegistry::for_pair(pair);
    for cluster_id in 0..pair.k {
        let terms = top_terms(pair, cluster_id, n_terms);
        let label = suggest_label(&terms);
        let joined = terms
            .iter()
            .map(|(t, _)| t.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        log::debug!("cluster {cluster_id}: {label} ({joined})");
        registry.clusters.insert(
            cluster_id,
            LabelEntry {
                label: label.to_string(),
                top_terms: Some(joined),
            },
        );
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_store::generation_of;
    use crate::partition::{KMeansModel, PartitionParams};
    use crate::vectorize::{DfBound, TfidfVectorizer, VectorizerParams};

    fn terms(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|&(t, w)| (t.to_string(), w)).collect()
    }

    #[test]
    fn picks_highest_scoring_rule() {
        let t = terms(&[("spark", 0.5), ("airflow", 0.3), ("tableau", 0.4)]);
        assert_eq!(suggest_label(&t), "Data Engineer");
    }

    #[test]
    fn bigram_keywords_match_exactly() {
        let t = terms(&[("power bi", 0.6), ("sql", 0.2)]);
        assert_eq!(suggest_label(&t), "BI/Analytics");
    }

    #[test]
    fn unigram_keyword_matches_inside_bigram_term() {
        let t = terms(&[("apache spark", 0.6)]);
        assert_eq!(suggest_label(&t), "Data Engineer");
    }

    #[test]
    fn nothing_matches_is_mixed() {
        assert_eq!(suggest_label(&terms(&[("boulangerie", 0.9)])), MIXED_LABEL);
        assert_eq!(suggest_label(&[]), MIXED_LABEL);
    }

    #[test]
    fn derives_one_entry_per_cluster_bound_to_generation() {
        let docs = ["python spark airflow", "spark airflow etl", "java spring backend", "java spring api"];
        let v = TfidfVectorizer::fit(
            &docs,
            VectorizerParams {
                max_features: None,
                min_df: DfBound::Count(1),
                max_df: DfBound::Ratio(1.0),
                ngram_range: [1, 1],
                sublinear_tf: false,
            },
        )
        .unwrap();
        let m = KMeansModel::fit(&v.transform_all(&docs), &PartitionParams { k: 2, ..Default::default() }).unwrap();
        let pair = ModelPair {
            k: 2,
            generation: generation_of(&v, &m).unwrap(),
            trained_at: 0,
            n_documents: 4,
            vectorizer: v,
            partition: m,
        };

        let registry = derive_registry(&pair, 5);
        assert!(registry.ensure_matches(&pair).is_ok());
        assert_eq!(registry.clusters.len(), 2);
        let mut labels: Vec<&str> = (0..2).map(|c| registry.resolve(c)).collect();
        labels.sort();
        assert_eq!(labels, vec!["Data Engineer", "Software Engineer"]);
        assert!(registry.top_terms(0).is_some_and(|t| !t.is_empty()));
    }
}
