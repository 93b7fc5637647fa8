//! Document-at-a-time conjunctive matching and top-k ranking.

use crate::config::{ProcessorConfig, TOP_K};
use crate::query::loader::{PostingsLoader, Query, QueryLoader};
use crate::query::scorer::Scorer;
use crate::tokenizer::Analyzer;
use crate::types::{DocId, Posting, QueryHit, QueryOutput};
use crate::{IndexError, Result};
use ahash::{AHashMap, AHashSet};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io::Write;
use std::time::{Duration, Instant};

/// A candidate with its accumulated score.
///
/// Ordering is total and deterministic: higher score wins, then the
/// lexicographically smaller docid. Tie ordering is an implementation
/// detail, not a contract.
struct ScoredDoc {
    score: f64,
    docid: DocId,
}

impl PartialEq for ScoredDoc {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredDoc {}

impl PartialOrd for ScoredDoc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredDoc {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.docid.cmp(&self.docid))
    }
}

/// Docids present in every query token's posting list. Empty whenever any
/// token has no postings.
pub fn conjunctive_match(
    postings: &AHashMap<String, Vec<Posting>>,
    tokens: &[String],
) -> AHashSet<DocId> {
    if tokens.is_empty() {
        return AHashSet::new();
    }

    let mut candidates: Option<AHashSet<DocId>> = None;
    for token in tokens {
        let Some(list) = postings.get(token) else {
            return AHashSet::new();
        };
        let docids: AHashSet<&DocId> = list.iter().map(|(docid, _)| docid).collect();
        match candidates {
            Some(ref mut current) => current.retain(|docid| docids.contains(docid)),
            None => candidates = Some(docids.into_iter().cloned().collect()),
        }
        if candidates.as_ref().is_some_and(|current| current.is_empty()) {
            break;
        }
    }
    candidates.unwrap_or_default()
}

/// Scores each candidate completely before moving to the next, keeping only
/// the top `k` in a bounded min-heap.
pub struct QueryProcessor {
    postings: AHashMap<String, Vec<Posting>>,
    scorer: Scorer,
    top_k: usize,
}

impl QueryProcessor {
    pub fn new(postings: AHashMap<String, Vec<Posting>>, scorer: Scorer) -> Self {
        Self {
            postings,
            scorer,
            top_k: TOP_K,
        }
    }

    pub fn matching_docids(&self, tokens: &[String]) -> AHashSet<DocId> {
        conjunctive_match(&self.postings, tokens)
    }

    /// Ranks `candidates` for one query, best first.
    pub fn rank(&mut self, query: &Query, candidates: AHashSet<DocId>) -> QueryOutput {
        // Per-token docid -> tf lookup so each candidate scores in O(tokens).
        let frequency_maps: Vec<AHashMap<&str, u32>> = query
            .tokens
            .iter()
            .map(|token| {
                self.postings
                    .get(token)
                    .map(|list| {
                        list.iter()
                            .map(|(docid, tf)| (docid.as_str(), *tf))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();

        let mut heap: BinaryHeap<Reverse<ScoredDoc>> = BinaryHeap::with_capacity(self.top_k + 1);
        for docid in candidates {
            let mut score = 0.0;
            for (token, frequencies) in query.tokens.iter().zip(&frequency_maps) {
                if let Some(&tf) = frequencies.get(docid.as_str()) {
                    score += self.scorer.score(token, tf, &docid);
                }
            }
            heap.push(Reverse(ScoredDoc { score, docid }));
            if heap.len() > self.top_k {
                heap.pop();
            }
        }

        let results = heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(doc)| QueryHit {
                id: doc.docid,
                score: doc.score,
            })
            .collect();
        QueryOutput {
            query: query.text.clone(),
            results,
        }
    }
}

/// Full query pipeline: load, match, rank, print one pretty-printed JSON
/// block per query on stdout.
pub fn run(config: &ProcessorConfig) -> Result<()> {
    let analyzer = Analyzer::english();
    let queries = QueryLoader::load(&config.queries_file_path, &analyzer)?;
    let needed_tokens = QueryLoader::needed_tokens(&queries);

    let loader = PostingsLoader::new(&config.index_file_path);
    let statistics = loader.load_statistics()?;

    let load_start = Instant::now();
    let lexicon = loader.load_lexicon(&needed_tokens)?;
    let postings = loader.load_postings(&needed_tokens)?;
    tracing::info!(
        queries = queries.len(),
        terms = postings.len(),
        lexicon_terms = lexicon.len(),
        elapsed = ?load_start.elapsed(),
        "index loaded"
    );

    // Candidates for every query up front: their union keys the
    // document-index load.
    let mut matching_times = Vec::with_capacity(queries.len());
    let mut all_candidates: AHashSet<DocId> = AHashSet::new();
    let mut per_query_candidates = Vec::with_capacity(queries.len());
    for query in &queries {
        let matching_start = Instant::now();
        let candidates = conjunctive_match(&postings, &query.tokens);
        let matching_time = matching_start.elapsed();
        tracing::debug!(
            query = %query.text,
            candidates = candidates.len(),
            elapsed = ?matching_time,
            "query matched"
        );
        matching_times.push(matching_time);
        all_candidates.extend(candidates.iter().cloned());
        per_query_candidates.push(candidates);
    }
    let document_index = loader.load_document_index(&all_candidates)?;

    let scorer = Scorer::new(
        lexicon,
        document_index,
        statistics.document_count,
        statistics.average_tokens_per_document,
        config.ranker,
    );
    let mut processor = QueryProcessor::new(postings, scorer);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut ranking_times = Vec::with_capacity(queries.len());
    for (query, candidates) in queries.iter().zip(per_query_candidates) {
        let ranking_start = Instant::now();
        let output = processor.rank(query, candidates);
        let ranking_time = ranking_start.elapsed();
        tracing::debug!(
            query = %query.text,
            results = output.results.len(),
            elapsed = ?ranking_time,
            "query ranked"
        );
        ranking_times.push(ranking_time);

        let block = serde_json::to_string_pretty(&output)
            .map_err(|e| IndexError::Query(format!("cannot encode results: {e}")))?;
        writeln!(out, "{block}")?;
    }

    if !queries.is_empty() {
        let avg = |times: &[Duration]| {
            times.iter().sum::<Duration>().as_secs_f64() / times.len() as f64
        };
        tracing::info!(
            avg_matching_seconds = avg(&matching_times),
            avg_ranking_seconds = avg(&ranking_times),
            "query processing finished"
        );
    }
    Ok(())
}
