//! In-memory posting accumulator with a derived flush threshold.

use crate::config::{ESTIMATED_BYTES_PER_POSTING, ONE_MB};
use crate::types::Posting;
use ahash::AHashMap;

/// Write buffer mapping each token to its growing posting list.
///
/// The buffer does not measure its own heap usage; it counts postings and
/// flushes when the count crosses `max_entries`, derived from the worker's
/// megabyte budget and the estimated per-posting cost.
pub struct InMemoryIndex {
    postings: AHashMap<String, Vec<Posting>>,
    entry_count: u64,
    max_entries: u64,
}

impl InMemoryIndex {
    pub fn new(memory_budget_mb: u64) -> Self {
        let max_entries = (memory_budget_mb * ONE_MB / ESTIMATED_BYTES_PER_POSTING).max(1);
        Self::with_max_entries(max_entries)
    }

    /// Direct threshold control, used by tests to force tiny flushes.
    pub fn with_max_entries(max_entries: u64) -> Self {
        Self {
            postings: AHashMap::new(),
            entry_count: 0,
            max_entries: max_entries.max(1),
        }
    }

    /// Appends one posting per unique token in the document.
    ///
    /// Returns true when the posting counter crossed `max_entries` during
    /// this call; the counter resets but the buffer keeps its contents until
    /// the caller flushes and calls [`reset`](Self::reset).
    pub fn index_document(&mut self, docid: &str, token_frequencies: AHashMap<String, u32>) -> bool {
        for (token, tf) in token_frequencies {
            self.postings
                .entry(token)
                .or_default()
                .push((docid.to_string(), tf));
            self.entry_count += 1;
        }

        if self.entry_count >= self.max_entries {
            self.entry_count = 0;
            return true;
        }
        false
    }

    /// Read-only view for the partial writer during a flush.
    pub fn snapshot(&self) -> &AHashMap<String, Vec<Posting>> {
        &self.postings
    }

    /// Clears all accumulated postings. Called after each flush.
    pub fn reset(&mut self) {
        self.postings.clear();
        self.entry_count = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tf(pairs: &[(&str, u32)]) -> AHashMap<String, u32> {
        pairs.iter().map(|(t, n)| (t.to_string(), *n)).collect()
    }

    #[test]
    fn accumulates_postings_in_call_order() {
        let mut index = InMemoryIndex::with_max_entries(100);
        assert!(!index.index_document("d1", tf(&[("alpha", 2)])));
        assert!(!index.index_document("d2", tf(&[("alpha", 1)])));

        let list = &index.snapshot()["alpha"];
        assert_eq!(list, &[("d1".to_string(), 2), ("d2".to_string(), 1)]);
    }

    #[test]
    fn signals_when_threshold_crossed() {
        let mut index = InMemoryIndex::with_max_entries(2);
        assert!(!index.index_document("d1", tf(&[("alpha", 1)])));
        assert!(index.index_document("d2", tf(&[("alpha", 1)])));
        // Counter reset, buffer intact until reset().
        assert_eq!(index.snapshot()["alpha"].len(), 2);
        assert!(!index.index_document("d3", tf(&[("beta", 1)])));
    }

    #[test]
    fn threshold_mid_document_keeps_remaining_tokens() {
        let mut index = InMemoryIndex::with_max_entries(1);
        assert!(index.index_document("d1", tf(&[("alpha", 2), ("beta", 1)])));
        // Both tokens were appended even though the counter crossed early.
        assert_eq!(index.snapshot().len(), 2);
    }

    #[test]
    fn reset_clears_buffer_and_counter() {
        let mut index = InMemoryIndex::with_max_entries(2);
        index.index_document("d1", tf(&[("alpha", 1)]));
        index.reset();
        assert!(index.is_empty());
        assert!(!index.index_document("d2", tf(&[("beta", 1)])));
    }

    #[test]
    fn derives_threshold_from_budget() {
        let index = InMemoryIndex::new(1);
        assert_eq!(index.max_entries, ONE_MB / ESTIMATED_BYTES_PER_POSTING);
    }
}
