//! Runtime configuration and tuning constants
//!
//! Provides validated configuration for both pipelines plus the policy knobs
//! that bound resident memory during indexing.

use crate::types::Ranker;
use crate::{IndexError, Result};
use std::path::{Path, PathBuf};
use std::thread;

pub const ONE_MB: u64 = 1024 * 1024;

/// Estimated amortized heap cost of one accumulated posting.
///
/// A posting is a `(String docid, u32 tf)` pair inside an
/// `AHashMap<String, Vec<_>>`: a 24-byte `String` header, a short heap-
/// allocated id, the counter padded to 8 bytes, and amortized map and vector
/// overhead. This is a policy knob, not a measured value; it exists so the
/// flush threshold can be derived from a megabyte budget.
pub const ESTIMATED_BYTES_PER_POSTING: u64 = 64;

/// Fixed allowance reserved per worker for stack, channel buffers, and
/// allocator slack, subtracted before the posting budget is derived.
pub const OVERHEAD_PER_WORKER_MB: u64 = 40;

/// Fraction of the configured limit treated as the usable soft ceiling.
pub const SOFT_LIMIT_FRACTION: f64 = 0.8;

/// Documents per batch on the work queue.
pub const BATCH_SIZE: usize = 1000;

/// Capacity of the bounded work queue; the streamer blocks when it is full.
pub const QUEUE_CAPACITY: usize = 8;

/// Upper bound on the worker count regardless of available parallelism.
pub const MAX_WORKERS: usize = 8;

/// Results returned per query.
pub const TOP_K: usize = 10;

/// Validated configuration for the indexing pipeline.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Total memory budget for the whole pipeline, in MB.
    pub memory_limit_mb: u64,

    /// JSON-lines corpus file.
    pub corpus_path: PathBuf,

    /// Output directory, created if missing.
    pub index_dir: PathBuf,

    /// Number of index workers.
    pub num_workers: usize,

    /// Documents per batch on the work queue.
    pub batch_size: usize,
}

impl IndexerConfig {
    pub fn new(memory_limit_mb: u64, corpus_path: PathBuf, index_dir: PathBuf) -> Result<Self> {
        if memory_limit_mb == 0 {
            return Err(IndexError::Config(
                "memory limit must be a positive number of MB".to_string(),
            ));
        }
        if corpus_path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            return Err(IndexError::Config(format!(
                "corpus file must be a .jsonl file: {}",
                corpus_path.display()
            )));
        }
        Ok(Self {
            memory_limit_mb,
            corpus_path,
            index_dir,
            num_workers: default_worker_count(),
            batch_size: BATCH_SIZE,
        })
    }

    /// Posting-accumulation budget left after reserving headroom for the
    /// process itself: `0.8 * limit - current_rss`. Fails fast when the
    /// process already exceeds the soft ceiling.
    pub fn memory_budget_mb(&self, current_rss_mb: u64) -> Result<u64> {
        let soft_limit = (self.memory_limit_mb as f64 * SOFT_LIMIT_FRACTION) as u64;
        if soft_limit <= current_rss_mb {
            return Err(IndexError::Config(format!(
                "memory budget is too low: {} MB resident against a {} MB soft limit; \
                 increase the memory limit",
                current_rss_mb, soft_limit
            )));
        }
        Ok(soft_limit - current_rss_mb)
    }

    /// Per-worker accumulation budget: an even split of the pipeline budget
    /// minus the fixed per-worker overhead allowance.
    pub fn worker_budget_mb(&self, memory_budget_mb: u64) -> Result<u64> {
        let share = memory_budget_mb / self.num_workers as u64;
        if share <= OVERHEAD_PER_WORKER_MB {
            return Err(IndexError::Config(format!(
                "memory budget is too low: {} MB per worker does not cover the \
                 {} MB overhead allowance; increase the memory limit",
                share, OVERHEAD_PER_WORKER_MB
            )));
        }
        Ok(share - OVERHEAD_PER_WORKER_MB)
    }
}

/// Validated configuration for the query pipeline.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Final inverted index file; the lexicon, document index, and
    /// statistics are located next to it.
    pub index_file_path: PathBuf,

    /// Queries file, one query per line.
    pub queries_file_path: PathBuf,

    /// Scoring function.
    pub ranker: Ranker,
}

impl ProcessorConfig {
    pub fn new(index_file_path: PathBuf, queries_file_path: PathBuf, ranker: Ranker) -> Result<Self> {
        if index_file_path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            return Err(IndexError::Config(format!(
                "index file must be a .jsonl file: {}",
                index_file_path.display()
            )));
        }
        Ok(Self {
            index_file_path,
            queries_file_path,
            ranker,
        })
    }

    /// Directory holding the index artifacts.
    pub fn index_dir(&self) -> &Path {
        self.index_file_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_WORKERS)
}
