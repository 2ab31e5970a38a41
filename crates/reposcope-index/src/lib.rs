//! Repository indexing for reposcope: line chunking, an exact L2 vector
//! index with snapshot persistence, and a concurrent indexing orchestrator.

pub mod chunker;
pub mod error;
pub mod indexer;
pub mod repo;
pub mod retriever;
pub mod store;

pub use chunker::{Chunk, LineAccumulator, chunk_file};
pub use error::IndexError;
pub use indexer::{FileFailure, IndexReport, IndexerConfig, RepoIndexer, list_files};
pub use repo::{CloneOutcome, RepositoryManager};
pub use retriever::Retriever;
pub use store::{FlatIndex, SearchHit, VectorStore};
