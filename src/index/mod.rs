//! Indexing pipeline
//!
//! Data flow: corpus → streamer → bounded queue → N workers → sorted partial
//! files + per-worker fragments → k-way merge → final index + lexicon +
//! document index + statistics.

pub mod memory;
pub mod merger;
pub mod orchestrator;
pub mod partial;
pub mod streamer;
pub mod worker;

pub use memory::InMemoryIndex;
pub use merger::{IndexMerger, MergeSummary};
pub use orchestrator::Indexer;
pub use partial::PartialIndexWriter;
pub use streamer::DocumentStreamer;
pub use worker::IndexWorker;
