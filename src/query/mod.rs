//! Query pipeline
//!
//! Data flow: queries file → tokenized query set → one-pass filtered loads
//! of the final index, lexicon, and document index → DAAT conjunctive
//! matching → BM25/TF-IDF scoring → top-k per query.

pub mod loader;
pub mod processor;
pub mod scorer;

pub use loader::{PostingsLoader, Query, QueryLoader};
pub use processor::QueryProcessor;
pub use scorer::Scorer;
