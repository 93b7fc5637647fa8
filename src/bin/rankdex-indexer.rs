//! Indexer CLI: builds the inverted index from a JSON-lines corpus.

use clap::Parser;
use rankdex::index::Indexer;
use rankdex::IndexerConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rankdex-indexer",
    version,
    about = "Builds an inverted index, lexicon, and document index from a JSON-lines corpus"
)]
struct Args {
    /// Total memory budget for the pipeline in MB
    #[arg(short = 'm', long = "memory_limit_mb")]
    memory_limit_mb: u64,

    /// Corpus file to index; must be a .jsonl file
    #[arg(short = 'c', long = "corpus_path")]
    corpus_path: PathBuf,

    /// Directory where index files are written, created if missing
    #[arg(short = 'i', long = "index_dir")]
    index_dir: PathBuf,
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
    let config = IndexerConfig::new(args.memory_limit_mb, args.corpus_path, args.index_dir)?;
    let stats = Indexer::new(config).run()?;

    println!(
        "Indexing completed: {} documents, {} lists, {:.2} MB in {:.2}s",
        stats.document_count, stats.list_count, stats.index_size_mb, stats.elapsed_seconds
    );
    Ok(())
}
