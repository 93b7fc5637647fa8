//! Processor CLI: runs ranked queries against a built index.

use clap::Parser;
use rankdex::query::processor;
use rankdex::{ProcessorConfig, Ranker};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rankdex-processor",
    version,
    about = "Ranks documents for each query with BM25 or TF-IDF over a built index"
)]
struct Args {
    /// Final inverted index file; must be a .jsonl file
    #[arg(short = 'i', long = "index_file_path")]
    index_file_path: PathBuf,

    /// Queries file, one query per line
    #[arg(short = 'q', long = "queries_file_path")]
    queries_file_path: PathBuf,

    /// Scoring function
    #[arg(short = 'r', long = "ranker", value_enum)]
    ranker: Ranker,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ProcessorConfig::new(args.index_file_path, args.queries_file_path, args.ranker)?;
    processor::run(&config)?;
    Ok(())
}
