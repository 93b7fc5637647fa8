//! BM25 and TF-IDF scoring over the loaded lexicon and document index.

use crate::types::{DocId, DocumentEntry, LexiconRecord, Ranker};
use ahash::AHashMap;

/// BM25 parameters.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    /// Term frequency saturation (typically 1.2-2.0).
    pub k1: f64,

    /// Length normalization strength (typically 0.75).
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Per-token score contributions for one ranker.
///
/// IDF values are cached per `(ranker, token)`: the two rankers smooth
/// differently, so the ranker is part of the key even though one scorer
/// instance only ever runs one ranker.
pub struct Scorer {
    lexicon: AHashMap<String, LexiconRecord>,
    document_index: AHashMap<DocId, DocumentEntry>,
    total_documents: u64,
    average_document_token_count: f64,
    params: Bm25Params,
    ranker: Ranker,
    idf_cache: AHashMap<(Ranker, String), f64>,
}

impl Scorer {
    pub fn new(
        lexicon: AHashMap<String, LexiconRecord>,
        document_index: AHashMap<DocId, DocumentEntry>,
        total_documents: u64,
        average_document_token_count: f64,
        ranker: Ranker,
    ) -> Self {
        Self {
            lexicon,
            document_index,
            total_documents,
            average_document_token_count,
            params: Bm25Params::default(),
            ranker,
            idf_cache: AHashMap::new(),
        }
    }

    /// Contribution of `token` occurring `term_frequency` times in `docid`.
    ///
    /// Tokens missing from the lexicon and documents missing from the
    /// document index contribute zero, as does any zero denominator.
    pub fn score(&mut self, token: &str, term_frequency: u32, docid: &str) -> f64 {
        match self.ranker {
            Ranker::Bm25 => self.bm25(token, term_frequency, docid),
            Ranker::Tfidf => self.tfidf(token, term_frequency, docid),
        }
    }

    fn tfidf(&mut self, token: &str, term_frequency: u32, docid: &str) -> f64 {
        let Some(doc) = self.document_index.get(docid) else {
            return 0.0;
        };
        if doc.token_count == 0 {
            return 0.0;
        }
        let tf = term_frequency as f64 / doc.token_count as f64;
        tf * self.idf(token)
    }

    fn bm25(&mut self, token: &str, term_frequency: u32, docid: &str) -> f64 {
        let Some(doc_token_count) = self.document_index.get(docid).map(|doc| doc.token_count) else {
            return 0.0;
        };
        let idf = self.idf(token);
        let tf = term_frequency as f64;
        let Bm25Params { k1, b } = self.params;

        let length_ratio = if self.average_document_token_count > 0.0 {
            doc_token_count as f64 / self.average_document_token_count
        } else {
            0.0
        };
        let numerator = tf * (k1 + 1.0);
        let denominator = tf + k1 * (1.0 - b + b * length_ratio);
        if denominator == 0.0 {
            return 0.0;
        }
        idf * numerator / denominator
    }

    /// Smoothed inverse document frequency for the active ranker.
    fn idf(&mut self, token: &str) -> f64 {
        let key = (self.ranker, token.to_string());
        if let Some(&cached) = self.idf_cache.get(&key) {
            return cached;
        }

        let Some(entry) = self.lexicon.get(token) else {
            return 0.0;
        };
        let n = self.total_documents as f64;
        let df = entry.document_frequency as f64;
        let idf = match self.ranker {
            Ranker::Bm25 => (1.0 + (n - df + 0.5) / (df + 0.5)).ln(),
            Ranker::Tfidf => ((n + 1.0) / (df + 1.0)).ln(),
        };
        self.idf_cache.insert(key, idf);
        idf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicon(entries: &[(&str, u64, u64)]) -> AHashMap<String, LexiconRecord> {
        entries
            .iter()
            .map(|(token, df, cf)| {
                (
                    token.to_string(),
                    LexiconRecord {
                        token: token.to_string(),
                        document_frequency: *df,
                        term_frequency_corpus: *cf,
                    },
                )
            })
            .collect()
    }

    fn documents(entries: &[(&str, u64)]) -> AHashMap<DocId, DocumentEntry> {
        entries
            .iter()
            .map(|(id, token_count)| {
                (
                    id.to_string(),
                    DocumentEntry {
                        id: id.to_string(),
                        character_count: 0,
                        token_count: *token_count,
                    },
                )
            })
            .collect()
    }

    // Two documents, avg length 2.5: the worked BM25 example from the
    // alpha/beta/gamma corpus.
    fn bm25_scorer() -> Scorer {
        Scorer::new(
            lexicon(&[("alpha", 1, 2), ("beta", 2, 2), ("gamma", 1, 1)]),
            documents(&[("d1", 3), ("d2", 2)]),
            2,
            2.5,
            Ranker::Bm25,
        )
    }

    #[test]
    fn bm25_matches_closed_form() {
        let mut scorer = bm25_scorer();

        // df=1 -> ln(1 + 1.5/1.5) = ln 2; df=2 -> ln(1 + 0.5/2.5) = ln 1.2
        let idf_alpha = 2.0f64.ln();
        let idf_beta = 1.2f64.ln();
        let norm_d1 = 1.0 - 0.75 + 0.75 * (3.0 / 2.5);

        let expected_alpha = idf_alpha * (2.0 * 2.5) / (2.0 + 1.5 * norm_d1);
        let expected_beta = idf_beta * (1.0 * 2.5) / (1.0 + 1.5 * norm_d1);

        assert!((scorer.score("alpha", 2, "d1") - expected_alpha).abs() < 1e-9);
        assert!((scorer.score("beta", 1, "d1") - expected_beta).abs() < 1e-9);
    }

    #[test]
    fn tfidf_matches_closed_form() {
        let mut scorer = Scorer::new(
            lexicon(&[("gamma", 1, 1)]),
            documents(&[("d2", 2)]),
            2,
            2.5,
            Ranker::Tfidf,
        );

        // (1/2) * ln((2+1)/(1+1))
        let expected = 0.5 * 1.5f64.ln();
        assert!((scorer.score("gamma", 1, "d2") - expected).abs() < 1e-9);
    }

    #[test]
    fn unknown_token_scores_zero() {
        let mut scorer = bm25_scorer();
        assert_eq!(scorer.score("delta", 1, "d1"), 0.0);
    }

    #[test]
    fn unknown_document_scores_zero() {
        let mut scorer = bm25_scorer();
        assert_eq!(scorer.score("alpha", 1, "d9"), 0.0);
    }

    #[test]
    fn zero_token_count_document_scores_zero_under_tfidf() {
        let mut scorer = Scorer::new(
            lexicon(&[("alpha", 1, 1)]),
            documents(&[("d1", 0)]),
            1,
            0.0,
            Ranker::Tfidf,
        );
        assert_eq!(scorer.score("alpha", 1, "d1"), 0.0);
    }

    #[test]
    fn idf_cache_is_consistent_across_calls() {
        let mut scorer = bm25_scorer();
        let first = scorer.score("alpha", 2, "d1");
        let second = scorer.score("alpha", 2, "d1");
        assert_eq!(first, second);
        assert_eq!(scorer.idf_cache.len(), 1);
    }
}
