//! Sorted partial index files, one per flush.

use crate::types::Posting;
use crate::Result;
use ahash::AHashMap;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Borrowing mirror of `IndexRecord` so flushing never clones posting lists.
#[derive(Serialize)]
struct PartialRecord<'a> {
    token: &'a str,
    postings: &'a [Posting],
}

/// Serializes flushed accumulator snapshots as self-sorted JSONL files.
///
/// Files are named `index_{worker_id}_{flush_sequence}.jsonl`; each file
/// covers exactly one flush, so every file is sorted by token even when a
/// worker flushes many times.
pub struct PartialIndexWriter {
    index_dir: PathBuf,
    worker_id: usize,
    flush_sequence: u64,
}

impl PartialIndexWriter {
    pub fn new(index_dir: &Path, worker_id: usize) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;
        Ok(Self {
            index_dir: index_dir.to_path_buf(),
            worker_id,
            flush_sequence: 0,
        })
    }

    /// Writes one snapshot as the next partial file and returns its path.
    pub fn write(&mut self, snapshot: &AHashMap<String, Vec<Posting>>) -> Result<PathBuf> {
        let path = self.index_dir.join(format!(
            "index_{}_{}.jsonl",
            self.worker_id, self.flush_sequence
        ));
        self.flush_sequence += 1;

        let mut entries: Vec<(&String, &Vec<Posting>)> = snapshot.iter().collect();
        entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

        let mut out = BufWriter::new(File::create(&path)?);
        for (token, postings) in entries {
            let record = PartialRecord { token, postings };
            serde_json::to_writer(&mut out, &record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            out.write_all(b"\n")?;
        }
        out.flush()?;

        Ok(path)
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_sequence
    }
}
