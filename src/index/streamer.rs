//! Corpus streaming onto the bounded work queue.

use crate::types::Document;
use crate::{IndexError, Result};
use crossbeam::channel::Sender;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A unit of work on the queue; `None` is the per-worker end-of-stream
/// sentinel.
pub type Batch = Vec<Document>;

/// Reads the JSON-lines corpus and enqueues fixed-size batches.
///
/// Backpressure comes from the bounded channel alone: `send` blocks while
/// every worker is busy and the queue is full.
pub struct DocumentStreamer {
    corpus_path: PathBuf,
    batch_size: usize,
}

impl DocumentStreamer {
    pub fn new(corpus_path: &Path, batch_size: usize) -> Self {
        Self {
            corpus_path: corpus_path.to_path_buf(),
            batch_size: batch_size.max(1),
        }
    }

    /// Streams the whole corpus, then sends one sentinel per worker.
    /// Returns the total number of documents enqueued.
    ///
    /// A malformed corpus line is fatal; a send failure means every worker
    /// hung up, which only happens after a worker error.
    pub fn stream(&self, queue: &Sender<Option<Batch>>, num_workers: usize) -> Result<u64> {
        let file = File::open(&self.corpus_path).map_err(|e| {
            IndexError::Corpus(format!("cannot open {}: {e}", self.corpus_path.display()))
        })?;
        let reader = BufReader::new(file);

        let mut document_count = 0u64;
        let mut batch = Vec::with_capacity(self.batch_size);

        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let document: Document = serde_json::from_str(&line).map_err(|e| {
                IndexError::Corpus(format!(
                    "malformed document on line {} of {}: {e}",
                    line_number + 1,
                    self.corpus_path.display()
                ))
            })?;
            document_count += 1;
            batch.push(document);

            if batch.len() >= self.batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                send_batch(queue, Some(full))?;
            }
        }

        if !batch.is_empty() {
            send_batch(queue, Some(batch))?;
        }
        for _ in 0..num_workers {
            send_batch(queue, None)?;
        }

        tracing::debug!(documents = document_count, "corpus streamed");
        Ok(document_count)
    }
}

fn send_batch(queue: &Sender<Option<Batch>>, item: Option<Batch>) -> Result<()> {
    queue
        .send(item)
        .map_err(|_| IndexError::Worker("all index workers disconnected".to_string()))
}
