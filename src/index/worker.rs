//! Index worker: tokenize, accumulate, flush on budget, drain on sentinel.

use crate::index::memory::InMemoryIndex;
use crate::index::partial::PartialIndexWriter;
use crate::index::streamer::Batch;
use crate::tokenizer::Analyzer;
use crate::types::{Document, DocumentEntry, WorkerStats};
use crate::{IndexError, Result};
use ahash::AHashMap;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One indexing worker.
///
/// Owns its accumulator and output files; the only thing shared with other
/// workers is the receiving end of the work queue, so there is no
/// cross-worker state to lock and each worker's memory budget is private.
pub struct IndexWorker {
    worker_id: usize,
    analyzer: Arc<Analyzer>,
    index: InMemoryIndex,
    writer: PartialIndexWriter,
    doc_index_path: PathBuf,
    stats_path: PathBuf,
}

impl IndexWorker {
    pub fn new(
        index_dir: &Path,
        worker_id: usize,
        memory_budget_mb: u64,
        analyzer: Arc<Analyzer>,
    ) -> Result<Self> {
        Ok(Self {
            worker_id,
            analyzer,
            index: InMemoryIndex::new(memory_budget_mb),
            writer: PartialIndexWriter::new(index_dir, worker_id)?,
            doc_index_path: index_dir.join(format!("document_index_{worker_id}.jsonl")),
            stats_path: index_dir.join(format!("worker_stats_{worker_id}.json")),
        })
    }

    /// Consumes batches until a sentinel arrives or the queue disconnects,
    /// then drains the accumulator and emits the stats record.
    ///
    /// Any per-document failure is fatal for the worker; the orchestrator
    /// observes the error on join and fails the pipeline.
    pub fn run(mut self, queue: Receiver<Option<Batch>>) -> Result<WorkerStats> {
        let mut doc_index = BufWriter::new(File::create(&self.doc_index_path)?);
        let mut total_tokens = 0u64;
        let mut documents_processed = 0u64;

        loop {
            match queue.recv_timeout(POLL_INTERVAL) {
                Ok(Some(batch)) => {
                    for document in &batch {
                        total_tokens += self.index_document(document, &mut doc_index)?;
                        documents_processed += 1;
                    }
                    tracing::trace!(
                        worker_id = self.worker_id,
                        documents_processed,
                        "batch indexed"
                    );
                }
                // Sentinel, or the streamer hung up after a failure:
                // either way, drain and exit.
                Ok(None) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => continue,
            }
        }

        if !self.index.is_empty() {
            tracing::debug!(
                worker_id = self.worker_id,
                flush = self.writer.flush_count(),
                "draining remaining index at stream end"
            );
            self.writer.write(self.index.snapshot())?;
            self.index.reset();
        }
        doc_index.flush()?;

        let stats = WorkerStats { total_tokens };
        let stats_json = serde_json::to_string(&stats)
            .map_err(|e| IndexError::Worker(format!("cannot encode worker stats: {e}")))?;
        std::fs::write(&self.stats_path, stats_json)?;

        tracing::debug!(
            worker_id = self.worker_id,
            documents_processed,
            total_tokens,
            flushes = self.writer.flush_count(),
            "worker finished"
        );
        Ok(stats)
    }

    /// Indexes one document and appends its document-index line.
    /// Returns the document's token count.
    fn index_document(
        &mut self,
        document: &Document,
        doc_index: &mut BufWriter<File>,
    ) -> Result<u64> {
        let tokens = self.analyzer.tokenize(&document.text);
        let token_count = tokens.len() as u64;

        let entry = DocumentEntry {
            id: document.id.clone(),
            character_count: document.text.chars().count() as u64,
            token_count,
        };
        let line = serde_json::to_string(&entry)
            .map_err(|e| IndexError::Worker(format!("cannot encode document entry: {e}")))?;
        doc_index.write_all(line.as_bytes())?;
        doc_index.write_all(b"\n")?;

        let mut frequencies: AHashMap<String, u32> = AHashMap::new();
        for token in tokens {
            *frequencies.entry(token).or_insert(0) += 1;
        }

        if self.index.index_document(&document.id, frequencies) {
            tracing::debug!(
                worker_id = self.worker_id,
                flush = self.writer.flush_count(),
                "memory budget reached, flushing partial index"
            );
            self.writer.write(self.index.snapshot())?;
            self.index.reset();
        }
        Ok(token_count)
    }
}
