use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jobclust", version, about = "Incremental clustering and labeling of job postings")]
pub struct Cli {
    /// Database path
    #[arg(long, env = "JOBCLUST_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Config file (default: ~/.jobclust/config.toml)
    #[arg(long, env = "JOBCLUST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load postings from a JSON Lines file
    Ingest(IngestArgs),
    /// Refit the vectorizer and partition on the whole corpus
    Train(TrainArgs),
    /// Cluster and label every unprocessed posting
    Assign(AssignArgs),
    /// Manage the cluster label registry
    Labels(LabelsArgs),
    /// Show corpus, cluster and model state
    Status(StatusArgs),
}

#[derive(Parser)]
pub struct IngestArgs {
    /// JSON Lines file, one posting per line
    pub file: PathBuf,

    /// Source name for lines that don't carry one
    #[arg(long)]
    pub source: Option<String>,
}

#[derive(Parser)]
pub struct TrainArgs {
    /// Number of clusters (overrides config)
    #[arg(short, long)]
    pub k: Option<usize>,
}

#[derive(Parser)]
pub struct AssignArgs {
    /// Label registry file
    #[arg(long, env = "JOBCLUST_LABELS")]
    pub labels: PathBuf,

    /// Number of clusters (overrides config)
    #[arg(short, long)]
    pub k: Option<usize>,

    /// Process at most N postings this run
    #[arg(long)]
    pub limit: Option<usize>,

    /// Train a model first if none exists for K
    #[arg(long)]
    pub retrain_if_missing: bool,
}

#[derive(Parser)]
pub struct LabelsArgs {
    #[command(subcommand)]
    pub command: LabelsCommand,
}

#[derive(Subcommand)]
pub enum LabelsCommand {
    /// Bind a cluster-to-label mapping to the current model
    Import(LabelsImportArgs),
    /// Derive labels from each cluster's top terms
    Suggest(LabelsSuggestArgs),
    /// Print the registry
    Show(LabelsShowArgs),
}

#[derive(Parser)]
pub struct LabelsImportArgs {
    /// JSON mapping: {"0": "Data Engineer", ...}
    pub mapping: PathBuf,

    /// Registry file to write
    #[arg(long, env = "JOBCLUST_LABELS")]
    pub labels: PathBuf,

    #[arg(short, long)]
    pub k: Option<usize>,
}

#[derive(Parser)]
pub struct LabelsSuggestArgs {
    /// Registry file to write
    #[arg(long, env = "JOBCLUST_LABELS")]
    pub labels: PathBuf,

    #[arg(short, long)]
    pub k: Option<usize>,

    /// Terms per cluster to keep with each label
    #[arg(long, default_value = "8")]
    pub top_terms: usize,
}

#[derive(Parser)]
pub struct LabelsShowArgs {
    #[arg(long, env = "JOBCLUST_LABELS")]
    pub labels: PathBuf,
}

#[derive(Parser)]
pub struct StatusArgs {
    /// Model K to report on (default from config)
    #[arg(short, long)]
    pub k: Option<usize>,
}
