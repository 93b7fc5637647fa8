//! Pipeline orchestration: budget split, worker lifecycle, merge, statistics.

use crate::config::{IndexerConfig, ONE_MB, QUEUE_CAPACITY};
use crate::index::merger::{FINAL_INDEX_FILE, IndexMerger};
use crate::index::streamer::{Batch, DocumentStreamer};
use crate::index::worker::IndexWorker;
use crate::tokenizer::Analyzer;
use crate::types::{IndexingStats, WorkerStats};
use crate::{mem, IndexError, Result};
use crossbeam::channel::bounded;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

pub const STATISTICS_FILE: &str = "indexing_statistics.json";

/// Drives the full indexing pipeline and writes `indexing_statistics.json`.
pub struct Indexer {
    config: IndexerConfig,
}

impl Indexer {
    pub fn new(config: IndexerConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<IndexingStats> {
        let start = Instant::now();
        fs::create_dir_all(&self.config.index_dir)?;

        // Fail fast on an impossible budget before any worker exists.
        let current_rss_mb = mem::current_rss_mb();
        let memory_budget_mb = self.config.memory_budget_mb(current_rss_mb)?;
        let worker_budget_mb = self.config.worker_budget_mb(memory_budget_mb)?;
        tracing::info!(
            workers = self.config.num_workers,
            current_rss_mb,
            memory_budget_mb,
            worker_budget_mb,
            "starting indexing pipeline"
        );

        let analyzer = Arc::new(Analyzer::english());
        let (sender, receiver) = bounded::<Option<Batch>>(QUEUE_CAPACITY);

        let mut handles = Vec::with_capacity(self.config.num_workers);
        for worker_id in 0..self.config.num_workers {
            let worker = IndexWorker::new(
                &self.config.index_dir,
                worker_id,
                worker_budget_mb,
                Arc::clone(&analyzer),
            )?;
            let queue = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("index-worker-{worker_id}"))
                .spawn(move || worker.run(queue))?;
            handles.push(handle);
        }
        drop(receiver);

        let streamer = DocumentStreamer::new(&self.config.corpus_path, self.config.batch_size);
        let stream_result = streamer.stream(&sender, self.config.num_workers);
        // Dropping the sender doubles as the stop signal when streaming
        // failed before the sentinels went out.
        drop(sender);

        let mut worker_failure: Option<IndexError> = None;
        for (worker_id, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::error!(worker_id, error = %e, "worker failed");
                    if worker_failure.is_none() {
                        worker_failure = Some(e);
                    }
                }
                Err(_) => {
                    if worker_failure.is_none() {
                        worker_failure =
                            Some(IndexError::Worker(format!("worker {worker_id} panicked")));
                    }
                }
            }
        }
        let document_count = stream_result?;
        if let Some(failure) = worker_failure {
            // Partial outputs stay on disk for inspection.
            return Err(failure);
        }

        let merger = IndexMerger::new(&self.config.index_dir);
        let summary = merger.merge()?;
        merger.merge_document_index()?;

        let total_tokens = self.collect_worker_stats()?;

        let final_index_path = self.config.index_dir.join(FINAL_INDEX_FILE);
        let stats = IndexingStats {
            index_size_mb: fs::metadata(&final_index_path)?.len() as f64 / ONE_MB as f64,
            elapsed_seconds: start.elapsed().as_secs_f64(),
            list_count: summary.list_count,
            average_list_size: if summary.list_count > 0 {
                summary.posting_count as f64 / summary.list_count as f64
            } else {
                0.0
            },
            document_count,
            average_tokens_per_document: if document_count > 0 {
                total_tokens as f64 / document_count as f64
            } else {
                0.0
            },
        };
        let stats_json = serde_json::to_string_pretty(&stats)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        fs::write(self.config.index_dir.join(STATISTICS_FILE), stats_json + "\n")?;

        tracing::info!(
            documents = stats.document_count,
            lists = stats.list_count,
            elapsed_seconds = stats.elapsed_seconds,
            "indexing pipeline finished"
        );
        Ok(stats)
    }

    /// Sums the per-worker stats records, deleting each file once read.
    fn collect_worker_stats(&self) -> Result<u64> {
        let mut total_tokens = 0u64;
        for worker_id in 0..self.config.num_workers {
            let path = self
                .config
                .index_dir
                .join(format!("worker_stats_{worker_id}.json"));
            let raw = fs::read_to_string(&path).map_err(|e| {
                IndexError::Worker(format!("missing stats for worker {worker_id}: {e}"))
            })?;
            let stats: WorkerStats = serde_json::from_str(&raw).map_err(|e| {
                IndexError::Worker(format!("malformed stats for worker {worker_id}: {e}"))
            })?;
            total_tokens += stats.total_tokens;
            fs::remove_file(&path)?;
        }
        Ok(total_tokens)
    }
}

/// Leftover per-flush and per-worker files in an index directory; empty
/// after a clean run.
pub fn leftover_fragments(index_dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(index_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_partial = name.starts_with("index_") && name.ends_with(".jsonl");
        let is_fragment = name.starts_with("document_index_") && name.ends_with(".jsonl");
        let is_stats = name.starts_with("worker_stats_") && name.ends_with(".json");
        if is_partial || is_fragment || is_stats {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
