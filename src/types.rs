//! Core record types for every on-disk artifact.
//!
//! All index artifacts are line-delimited JSON so they stay inspectable with
//! standard tooling; the structs here fix the field names on the wire.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Stable document identifier, opaque to the pipeline.
///
/// The corpus may carry numeric ids; they are canonicalized to their decimal
/// string on input and never inspected afterwards.
pub type DocId = String;

/// One `(docid, term_frequency)` pair; serializes as `[docid, tf]`.
pub type Posting = (DocId, u32);

/// A corpus document. Extra fields on the JSON line are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    #[serde(deserialize_with = "docid_from_json")]
    pub id: DocId,
    pub text: String,
}

fn docid_from_json<'de, D>(deserializer: D) -> std::result::Result<DocId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// One line of a partial or final inverted index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub token: String,
    pub postings: Vec<Posting>,
}

/// One line of `lexicon.jsonl`: per-token corpus statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconRecord {
    pub token: String,
    pub document_frequency: u64,
    pub term_frequency_corpus: u64,
}

/// One line of `document_index.jsonl`: per-document length statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub id: DocId,
    pub character_count: u64,
    pub token_count: u64,
}

/// Per-worker statistics record, emitted on worker termination and
/// aggregated by the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkerStats {
    pub total_tokens: u64,
}

/// `indexing_statistics.json`. The key names are part of the format: the
/// query processor reads `Number of Documents` and `Average Tokens per
/// Document` back from this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingStats {
    #[serde(rename = "Index Size (MB)")]
    pub index_size_mb: f64,

    #[serde(rename = "Elapsed Time (s)")]
    pub elapsed_seconds: f64,

    #[serde(rename = "Number of Lists")]
    pub list_count: u64,

    #[serde(rename = "Average List Size")]
    pub average_list_size: f64,

    #[serde(rename = "Number of Documents")]
    pub document_count: u64,

    #[serde(rename = "Average Tokens per Document")]
    pub average_tokens_per_document: f64,
}

/// Scoring function selector. Part of the IDF-cache key: the two rankers
/// smooth IDF differently, so cached values must not cross over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Ranker {
    // Pinned: clap's kebab-case default would render this as "bm-25".
    #[value(name = "bm25")]
    Bm25,
    #[value(name = "tfidf")]
    Tfidf,
}

/// Per-query result block printed by the processor.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    #[serde(rename = "Query")]
    pub query: String,

    #[serde(rename = "Results")]
    pub results: Vec<QueryHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    #[serde(rename = "ID")]
    pub id: DocId,

    #[serde(rename = "Score")]
    pub score: f64,
}
