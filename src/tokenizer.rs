//! Text analysis shared by the indexer and the query processor.
//!
//! One pipeline: split on non-alphanumeric, lowercase, drop English
//! stopwords, Snowball-stem the rest. Both sides must tokenize identically
//! or query tokens will never match indexed ones.

use ahash::AHashSet;
use rust_stemmers::{Algorithm, Stemmer};

/// Tokenizer for English text.
///
/// Construction builds the stopword set, so callers create one analyzer and
/// share it across workers.
pub struct Analyzer {
    stemmer: Stemmer,
    stop_words: AHashSet<String>,
}

impl Analyzer {
    pub fn english() -> Self {
        let stop_words = stop_words::get(stop_words::LANGUAGE::English)
            .into_iter()
            .collect();
        Self {
            stemmer: Stemmer::create(Algorithm::English),
            stop_words,
        }
    }

    /// Normalized token sequence for `text`.
    ///
    /// Stopwords are checked against the lowercased word before stemming,
    /// so "The" is dropped even though stemming would not touch it.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .filter(|word| !self.stop_words.contains(word))
            .map(|word| self.stemmer.stem(&word).into_owned())
            .collect()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::english()
    }
}
