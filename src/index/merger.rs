//! Streaming k-way merge of partial indexes into the final artifacts.

use crate::types::{DocumentEntry, IndexRecord, LexiconRecord, Posting};
use crate::{IndexError, Result};
use ahash::AHashMap;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const FINAL_INDEX_FILE: &str = "final_inverted_index.jsonl";
pub const LEXICON_FILE: &str = "lexicon.jsonl";
pub const DOCUMENT_INDEX_FILE: &str = "document_index.jsonl";

/// Counts produced by the merge, consumed by the statistics writer.
#[derive(Debug, Clone, Copy)]
pub struct MergeSummary {
    /// Distinct tokens in the final index.
    pub list_count: u64,

    /// Total postings across all lists.
    pub posting_count: u64,
}

/// Heap entry: the current record of one partial file.
///
/// Ordered by token, then by source index, so equal tokens pop in partial-
/// file order and the merge is deterministic for any batch distribution.
struct HeapEntry {
    token: String,
    postings: Vec<Posting>,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.token
            .cmp(&other.token)
            .then(self.source.cmp(&other.source))
    }
}

struct MergeSource {
    reader: BufReader<File>,
    path: PathBuf,
}

impl MergeSource {
    fn open(path: PathBuf) -> Result<Self> {
        let file = File::open(&path)
            .map_err(|e| IndexError::Merge(format!("cannot open partial {}: {e}", path.display())))?;
        Ok(Self {
            reader: BufReader::new(file),
            path,
        })
    }

    /// Next record, or `None` at end of file.
    fn read_record(&mut self) -> Result<Option<IndexRecord>> {
        let mut line = String::new();
        loop {
            line.clear();
            let bytes = self.reader.read_line(&mut line)?;
            if bytes == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                IndexError::Merge(format!("malformed partial {}: {e}", self.path.display()))
            })?;
            return Ok(Some(record));
        }
    }
}

/// Merges every partial file in the index directory into the final inverted
/// index and lexicon, holding only one record per source plus the list under
/// construction in memory.
pub struct IndexMerger {
    index_dir: PathBuf,
}

impl IndexMerger {
    pub fn new(index_dir: &Path) -> Self {
        Self {
            index_dir: index_dir.to_path_buf(),
        }
    }

    /// Runs the k-way merge. Each partial file is deleted as soon as its
    /// last record has been consumed.
    ///
    /// With no partials left and a final index already on disk this is a
    /// no-op apart from re-reading the lexicon for the summary, so re-running
    /// a completed merge never clobbers the outputs.
    pub fn merge(&self) -> Result<MergeSummary> {
        let partial_paths = self.partial_files()?;
        let final_path = self.index_dir.join(FINAL_INDEX_FILE);
        if partial_paths.is_empty() && final_path.exists() {
            return self.summarize_existing();
        }

        let mut sources = Vec::with_capacity(partial_paths.len());
        let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();
        for (source, path) in partial_paths.into_iter().enumerate() {
            let mut src = MergeSource::open(path)?;
            if let Some(record) = src.read_record()? {
                heap.push(Reverse(HeapEntry {
                    token: record.token,
                    postings: record.postings,
                    source,
                }));
                sources.push(Some(src));
            } else {
                // Empty partial: nothing to merge, consume and delete.
                std::fs::remove_file(&src.path)?;
                sources.push(None);
            }
        }

        // Temp write + rename: an aborted merge leaves no final index behind.
        let lexicon_path = self.index_dir.join(LEXICON_FILE);
        let tmp_final_path = final_path.with_extension("jsonl.tmp");
        let tmp_lexicon_path = lexicon_path.with_extension("jsonl.tmp");
        let mut index_out = BufWriter::new(File::create(&tmp_final_path)?);
        let mut lexicon_out = BufWriter::new(File::create(&tmp_lexicon_path)?);
        let mut summary = MergeSummary {
            list_count: 0,
            posting_count: 0,
        };

        while let Some(Reverse(entry)) = heap.pop() {
            self.refill(&mut sources, &mut heap, entry.source)?;

            let mut postings = entry.postings;
            while heap
                .peek()
                .is_some_and(|Reverse(next)| next.token == entry.token)
            {
                let Reverse(next) = heap.pop().expect("peeked entry");
                postings.extend(next.postings);
                self.refill(&mut sources, &mut heap, next.source)?;
            }
            coalesce(&mut postings);

            let document_frequency = postings.len() as u64;
            let term_frequency_corpus = postings.iter().map(|(_, tf)| *tf as u64).sum();
            summary.list_count += 1;
            summary.posting_count += document_frequency;

            write_line(
                &mut index_out,
                &IndexRecord {
                    token: entry.token.clone(),
                    postings,
                },
            )?;
            write_line(
                &mut lexicon_out,
                &LexiconRecord {
                    token: entry.token,
                    document_frequency,
                    term_frequency_corpus,
                },
            )?;
        }

        index_out.flush()?;
        lexicon_out.flush()?;
        std::fs::rename(&tmp_final_path, &final_path)?;
        std::fs::rename(&tmp_lexicon_path, &lexicon_path)?;

        tracing::info!(
            lists = summary.list_count,
            postings = summary.posting_count,
            "inverted index merged"
        );
        Ok(summary)
    }

    /// Concatenates per-worker document-index fragments into
    /// `document_index.jsonl`, validating every line, then deletes them.
    pub fn merge_document_index(&self) -> Result<u64> {
        let fragments = self.fragment_files()?;
        let out_path = self.index_dir.join(DOCUMENT_INDEX_FILE);
        if fragments.is_empty() && out_path.exists() {
            return Ok(0);
        }

        let tmp_path = out_path.with_extension("jsonl.tmp");
        let mut out = BufWriter::new(File::create(&tmp_path)?);
        let mut entries = 0u64;
        for path in &fragments {
            let file = File::open(path).map_err(|e| {
                IndexError::Merge(format!("cannot open fragment {}: {e}", path.display()))
            })?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                serde_json::from_str::<DocumentEntry>(&line).map_err(|e| {
                    IndexError::Merge(format!("malformed fragment {}: {e}", path.display()))
                })?;
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
                entries += 1;
            }
        }
        out.flush()?;
        std::fs::rename(&tmp_path, &out_path)?;

        for path in &fragments {
            std::fs::remove_file(path)?;
        }
        Ok(entries)
    }

    /// Pulls the next record from `source` into the heap; deletes the file
    /// once it is exhausted.
    fn refill(
        &self,
        sources: &mut [Option<MergeSource>],
        heap: &mut BinaryHeap<Reverse<HeapEntry>>,
        source: usize,
    ) -> Result<()> {
        let Some(src) = sources[source].as_mut() else {
            return Ok(());
        };
        match src.read_record()? {
            Some(record) => heap.push(Reverse(HeapEntry {
                token: record.token,
                postings: record.postings,
                source,
            })),
            None => {
                let exhausted = sources[source].take().expect("source present");
                std::fs::remove_file(&exhausted.path)?;
            }
        }
        Ok(())
    }

    /// Partial files, ordered by `(worker_id, flush_sequence)` so the heap's
    /// source tie-break follows corpus order rather than directory order.
    fn partial_files(&self) -> Result<Vec<PathBuf>> {
        let mut found: Vec<(u64, u64, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&self.index_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(key) = parse_partial_name(name) {
                found.push((key.0, key.1, path));
            }
        }
        found.sort();
        Ok(found.into_iter().map(|(_, _, path)| path).collect())
    }

    fn fragment_files(&self) -> Result<Vec<PathBuf>> {
        let mut found: Vec<(u64, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&self.index_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(worker) = name
                .strip_prefix("document_index_")
                .and_then(|rest| rest.strip_suffix(".jsonl"))
                .and_then(|id| id.parse::<u64>().ok())
            {
                found.push((worker, path));
            }
        }
        found.sort();
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    fn summarize_existing(&self) -> Result<MergeSummary> {
        let path = self.index_dir.join(LEXICON_FILE);
        let file = File::open(&path)
            .map_err(|e| IndexError::Merge(format!("cannot open {}: {e}", path.display())))?;
        let mut summary = MergeSummary {
            list_count: 0,
            posting_count: 0,
        };
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: LexiconRecord = serde_json::from_str(&line).map_err(|e| {
                IndexError::Merge(format!("malformed lexicon {}: {e}", path.display()))
            })?;
            summary.list_count += 1;
            summary.posting_count += record.document_frequency;
        }
        Ok(summary)
    }
}

/// Sums term frequencies for repeated docids, keeping first-occurrence
/// order. Worker sharding keeps docids disjoint across partials, so this is
/// a robustness path rather than the hot path.
fn coalesce(postings: &mut Vec<Posting>) {
    let mut seen: AHashMap<String, usize> = AHashMap::with_capacity(postings.len());
    let mut merged: Vec<Posting> = Vec::with_capacity(postings.len());
    for (docid, tf) in postings.drain(..) {
        match seen.get(&docid) {
            Some(&slot) => merged[slot].1 += tf,
            None => {
                seen.insert(docid.clone(), merged.len());
                merged.push((docid, tf));
            }
        }
    }
    *postings = merged;
}

fn write_line<T: serde::Serialize>(out: &mut BufWriter<File>, record: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, record)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    out.write_all(b"\n")?;
    Ok(())
}

fn parse_partial_name(name: &str) -> Option<(u64, u64)> {
    let rest = name.strip_prefix("index_")?.strip_suffix(".jsonl")?;
    let (worker, seq) = rest.split_once('_')?;
    Some((worker.parse().ok()?, seq.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_partial(dir: &Path, name: &str, lines: &[&str]) {
        fs::write(dir.join(name), lines.join("\n") + "\n").unwrap();
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn merges_two_partials_sorted_by_token() {
        let dir = TempDir::new().unwrap();
        write_partial(
            dir.path(),
            "index_0_0.jsonl",
            &[
                r#"{"token":"alpha","postings":[["d1",2]]}"#,
                r#"{"token":"beta","postings":[["d1",1]]}"#,
            ],
        );
        write_partial(
            dir.path(),
            "index_1_0.jsonl",
            &[
                r#"{"token":"beta","postings":[["d2",1]]}"#,
                r#"{"token":"gamma","postings":[["d2",1]]}"#,
            ],
        );

        let summary = IndexMerger::new(dir.path()).merge().unwrap();
        assert_eq!(summary.list_count, 3);
        assert_eq!(summary.posting_count, 4);

        assert_eq!(
            read_lines(&dir.path().join(FINAL_INDEX_FILE)),
            vec![
                r#"{"token":"alpha","postings":[["d1",2]]}"#,
                r#"{"token":"beta","postings":[["d1",1],["d2",1]]}"#,
                r#"{"token":"gamma","postings":[["d2",1]]}"#,
            ]
        );
        assert_eq!(
            read_lines(&dir.path().join(LEXICON_FILE)),
            vec![
                r#"{"token":"alpha","document_frequency":1,"term_frequency_corpus":2}"#,
                r#"{"token":"beta","document_frequency":2,"term_frequency_corpus":2}"#,
                r#"{"token":"gamma","document_frequency":1,"term_frequency_corpus":1}"#,
            ]
        );

        // Inputs consumed.
        assert!(!dir.path().join("index_0_0.jsonl").exists());
        assert!(!dir.path().join("index_1_0.jsonl").exists());
    }

    #[test]
    fn coalesces_duplicate_docids_across_partials() {
        let dir = TempDir::new().unwrap();
        write_partial(
            dir.path(),
            "index_0_0.jsonl",
            &[r#"{"token":"alpha","postings":[["d1",2]]}"#],
        );
        write_partial(
            dir.path(),
            "index_1_0.jsonl",
            &[r#"{"token":"alpha","postings":[["d1",3],["d2",1]]}"#],
        );

        IndexMerger::new(dir.path()).merge().unwrap();
        assert_eq!(
            read_lines(&dir.path().join(FINAL_INDEX_FILE)),
            vec![r#"{"token":"alpha","postings":[["d1",5],["d2",1]]}"#]
        );
        assert_eq!(
            read_lines(&dir.path().join(LEXICON_FILE)),
            vec![r#"{"token":"alpha","document_frequency":2,"term_frequency_corpus":6}"#]
        );
    }

    #[test]
    fn orders_sources_numerically_not_lexicographically() {
        let dir = TempDir::new().unwrap();
        // Eleven flushes from one worker; flush 2 must merge before flush 10.
        for seq in 0..11u32 {
            write_partial(
                dir.path(),
                &format!("index_0_{seq}.jsonl"),
                &[&format!(r#"{{"token":"alpha","postings":[["d{seq}",1]]}}"#)],
            );
        }

        IndexMerger::new(dir.path()).merge().unwrap();
        let line = &read_lines(&dir.path().join(FINAL_INDEX_FILE))[0];
        let record: IndexRecord = serde_json::from_str(line).unwrap();
        let docids: Vec<&str> = record.postings.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(
            docids,
            vec!["d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7", "d8", "d9", "d10"]
        );
    }

    #[test]
    fn empty_input_produces_empty_outputs() {
        let dir = TempDir::new().unwrap();
        let summary = IndexMerger::new(dir.path()).merge().unwrap();
        assert_eq!(summary.list_count, 0);
        assert!(read_lines(&dir.path().join(FINAL_INDEX_FILE)).is_empty());
        assert!(read_lines(&dir.path().join(LEXICON_FILE)).is_empty());
    }

    #[test]
    fn rerunning_after_merge_is_a_noop() {
        let dir = TempDir::new().unwrap();
        write_partial(
            dir.path(),
            "index_0_0.jsonl",
            &[r#"{"token":"alpha","postings":[["d1",2]]}"#],
        );
        let merger = IndexMerger::new(dir.path());
        let first = merger.merge().unwrap();
        let before = fs::read_to_string(dir.path().join(FINAL_INDEX_FILE)).unwrap();

        let second = merger.merge().unwrap();
        assert_eq!(second.list_count, first.list_count);
        assert_eq!(second.posting_count, first.posting_count);
        assert_eq!(
            fs::read_to_string(dir.path().join(FINAL_INDEX_FILE)).unwrap(),
            before
        );
    }

    #[test]
    fn malformed_partial_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_partial(dir.path(), "index_0_0.jsonl", &["not json"]);
        let err = IndexMerger::new(dir.path()).merge();
        assert!(matches!(err, Err(IndexError::Merge(_))));
        // An aborted merge must not leave a final index behind.
        assert!(!dir.path().join(FINAL_INDEX_FILE).exists());
    }

    #[test]
    fn concatenates_document_index_fragments() {
        let dir = TempDir::new().unwrap();
        write_partial(
            dir.path(),
            "document_index_0.jsonl",
            &[r#"{"id":"d1","character_count":16,"token_count":3}"#],
        );
        write_partial(
            dir.path(),
            "document_index_1.jsonl",
            &[r#"{"id":"d2","character_count":10,"token_count":2}"#],
        );

        let entries = IndexMerger::new(dir.path()).merge_document_index().unwrap();
        assert_eq!(entries, 2);
        assert_eq!(
            read_lines(&dir.path().join(DOCUMENT_INDEX_FILE)),
            vec![
                r#"{"id":"d1","character_count":16,"token_count":3}"#,
                r#"{"id":"d2","character_count":10,"token_count":2}"#,
            ]
        );
        assert!(!dir.path().join("document_index_0.jsonl").exists());
        assert!(!dir.path().join("document_index_1.jsonl").exists());
    }

    #[test]
    fn tiny_flush_threshold_merges_to_same_index_as_one_flush() {
        use crate::index::memory::InMemoryIndex;
        use crate::index::partial::PartialIndexWriter;
        use ahash::AHashMap;

        let documents: [(&str, &[(&str, u32)]); 2] = [
            ("d1", &[("alpha", 2), ("beta", 1)]),
            ("d2", &[("beta", 1), ("gamma", 1)]),
        ];

        // Reference run: everything fits in one flush.
        let one_flush = TempDir::new().unwrap();
        {
            let mut index = InMemoryIndex::with_max_entries(1000);
            let mut writer = PartialIndexWriter::new(one_flush.path(), 0).unwrap();
            for (docid, tokens) in documents {
                let tf: AHashMap<String, u32> =
                    tokens.iter().map(|(t, n)| (t.to_string(), *n)).collect();
                index.index_document(docid, tf);
            }
            writer.write(index.snapshot()).unwrap();
        }
        IndexMerger::new(one_flush.path()).merge().unwrap();

        // Constrained run: the threshold trips on every document.
        let many_flushes = TempDir::new().unwrap();
        {
            let mut index = InMemoryIndex::with_max_entries(2);
            let mut writer = PartialIndexWriter::new(many_flushes.path(), 0).unwrap();
            for (docid, tokens) in documents {
                let tf: AHashMap<String, u32> =
                    tokens.iter().map(|(t, n)| (t.to_string(), *n)).collect();
                if index.index_document(docid, tf) {
                    writer.write(index.snapshot()).unwrap();
                    index.reset();
                }
            }
            if !index.is_empty() {
                writer.write(index.snapshot()).unwrap();
            }
            assert!(writer.flush_count() > 1);
        }
        IndexMerger::new(many_flushes.path()).merge().unwrap();

        assert_eq!(
            fs::read_to_string(one_flush.path().join(FINAL_INDEX_FILE)).unwrap(),
            fs::read_to_string(many_flushes.path().join(FINAL_INDEX_FILE)).unwrap()
        );
        assert_eq!(
            fs::read_to_string(one_flush.path().join(LEXICON_FILE)).unwrap(),
            fs::read_to_string(many_flushes.path().join(LEXICON_FILE)).unwrap()
        );
    }

    #[test]
    fn shuffled_partial_distribution_merges_to_identical_content() {
        use rand::seq::SliceRandom;

        // Twenty documents dealt randomly across four workers.
        let mut docs: Vec<u32> = (0..20).collect();
        docs.shuffle(&mut rand::thread_rng());

        let dir = TempDir::new().unwrap();
        for (worker, chunk) in docs.chunks(5).enumerate() {
            let mut sorted: Vec<u32> = chunk.to_vec();
            sorted.sort_unstable();
            let lines: Vec<String> = sorted
                .iter()
                .map(|d| format!(r#"{{"token":"alpha","postings":[["d{d}",1]]}}"#))
                .collect();
            // One record per token per partial: give each doc its own flush.
            for (seq, line) in lines.iter().enumerate() {
                write_partial(
                    dir.path(),
                    &format!("index_{worker}_{seq}.jsonl"),
                    &[line.as_str()],
                );
            }
        }

        IndexMerger::new(dir.path()).merge().unwrap();
        let line = &read_lines(&dir.path().join(FINAL_INDEX_FILE))[0];
        let record: IndexRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.postings.len(), 20);
        let mut docids: Vec<&str> = record.postings.iter().map(|(d, _)| d.as_str()).collect();
        docids.sort_unstable();
        docids.dedup();
        assert_eq!(docids.len(), 20);
        assert_eq!(
            read_lines(&dir.path().join(LEXICON_FILE)),
            vec![r#"{"token":"alpha","document_frequency":20,"term_frequency_corpus":20}"#]
        );
    }

    #[test]
    fn malformed_fragment_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_partial(dir.path(), "document_index_0.jsonl", &["{broken"]);
        let err = IndexMerger::new(dir.path()).merge_document_index();
        assert!(matches!(err, Err(IndexError::Merge(_))));
    }
}
