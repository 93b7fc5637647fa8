//! Query loading and filtered one-pass loads of the index artifacts.

use crate::index::merger::{DOCUMENT_INDEX_FILE, LEXICON_FILE};
use crate::index::orchestrator::STATISTICS_FILE;
use crate::tokenizer::Analyzer;
use crate::types::{DocId, DocumentEntry, IndexRecord, IndexingStats, LexiconRecord, Posting};
use crate::{IndexError, Result};
use ahash::{AHashMap, AHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A query string together with its token sequence.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub tokens: Vec<String>,
}

pub struct QueryLoader;

impl QueryLoader {
    /// Reads one query per line, skipping blank lines, and pre-tokenizes
    /// each with the same analyzer the indexer used.
    pub fn load(queries_path: &Path, analyzer: &Analyzer) -> Result<Vec<Query>> {
        let file = File::open(queries_path).map_err(|e| {
            IndexError::Query(format!("cannot open {}: {e}", queries_path.display()))
        })?;

        let mut queries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            queries.push(Query {
                text: text.to_string(),
                tokens: analyzer.tokenize(text),
            });
        }
        Ok(queries)
    }

    /// Union of tokens across all queries; the load filter.
    pub fn needed_tokens(queries: &[Query]) -> AHashSet<String> {
        queries
            .iter()
            .flat_map(|q| q.tokens.iter().cloned())
            .collect()
    }
}

/// Loads only the records the query set needs, each artifact in one linear
/// scan, so memory stays proportional to the queries rather than the corpus.
pub struct PostingsLoader {
    index_file_path: PathBuf,
    index_dir: PathBuf,
}

impl PostingsLoader {
    pub fn new(index_file_path: &Path) -> Self {
        let index_dir = index_file_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        Self {
            index_file_path: index_file_path.to_path_buf(),
            index_dir,
        }
    }

    /// Posting lists for the needed tokens.
    pub fn load_postings(
        &self,
        needed_tokens: &AHashSet<String>,
    ) -> Result<AHashMap<String, Vec<Posting>>> {
        let mut postings = AHashMap::new();
        self.scan(&self.index_file_path, |record: IndexRecord| {
            if needed_tokens.contains(&record.token) {
                postings.insert(record.token, record.postings);
            }
        })?;
        tracing::debug!(terms = postings.len(), "posting lists loaded");
        Ok(postings)
    }

    /// Lexicon records for the needed tokens.
    pub fn load_lexicon(
        &self,
        needed_tokens: &AHashSet<String>,
    ) -> Result<AHashMap<String, LexiconRecord>> {
        let mut lexicon = AHashMap::new();
        self.scan(&self.index_dir.join(LEXICON_FILE), |record: LexiconRecord| {
            if needed_tokens.contains(&record.token) {
                lexicon.insert(record.token.clone(), record);
            }
        })?;
        tracing::debug!(terms = lexicon.len(), "lexicon loaded");
        Ok(lexicon)
    }

    /// Document-index entries for the candidate docids.
    pub fn load_document_index(
        &self,
        needed_docids: &AHashSet<DocId>,
    ) -> Result<AHashMap<DocId, DocumentEntry>> {
        let mut documents = AHashMap::new();
        self.scan(
            &self.index_dir.join(DOCUMENT_INDEX_FILE),
            |entry: DocumentEntry| {
                if needed_docids.contains(&entry.id) {
                    documents.insert(entry.id.clone(), entry);
                }
            },
        )?;
        tracing::debug!(documents = documents.len(), "document index loaded");
        Ok(documents)
    }

    pub fn load_statistics(&self) -> Result<IndexingStats> {
        let path = self.index_dir.join(STATISTICS_FILE);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| IndexError::Query(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| IndexError::Query(format!("malformed statistics {}: {e}", path.display())))
    }

    fn scan<T, F>(&self, path: &Path, mut keep: F) -> Result<()>
    where
        T: serde::de::DeserializeOwned,
        F: FnMut(T),
    {
        let file = File::open(path)
            .map_err(|e| IndexError::Query(format!("cannot open {}: {e}", path.display())))?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .map_err(|e| IndexError::Query(format!("malformed line in {}: {e}", path.display())))?;
            keep(record);
        }
        Ok(())
    }
}
