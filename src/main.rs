use clap::Parser;
use jobclust::JobclustError;
use jobclust::cli::{Cli, Command};
use jobclust::config::jobclust_dir;
use std::path::PathBuf;
use std::process::ExitCode;

fn default_db_path() -> PathBuf {
    jobclust_dir().join("jobs.db")
}

fn run() -> Result<(), JobclustError> {
    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(default_db_path);
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Ingest(args) => jobclust::ingest::handle_ingest(&db_path, &args),
        Command::Train(args) => jobclust::train::handle_train(&db_path, config_path, &args),
        Command::Assign(args) => jobclust::assign::handle_assign(&db_path, config_path, &args),
        Command::Labels(args) => jobclust::labels::handle_labels(config_path, &args),
        Command::Status(args) => jobclust::status::handle_status(&db_path, config_path, &args),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("jobclust: {e}");
            ExitCode::from(1)
        }
    }
}
