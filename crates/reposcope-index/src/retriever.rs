//! Query path: embed a question and look it up in the vector store.

use std::sync::Arc;

use crate::error::Result;
use crate::store::{SearchHit, VectorStore};
use reposcope_llm::{Embedder, EmbeddingProvider};

pub struct Retriever<P> {
    embedder: Arc<Embedder<P>>,
    store: Arc<VectorStore>,
}

impl<P: EmbeddingProvider> Retriever<P> {
    #[must_use]
    pub fn new(embedder: Arc<Embedder<P>>, store: Arc<VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// The `top_k` stored chunks closest to `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails or the query embedding has the
    /// wrong dimension.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 || self.store.is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).await?;
        let hits = self.store.search(&vector, top_k)?;
        tracing::debug!(top_k, hits = hits.len(), "retrieved chunks");
        Ok(hits)
    }
}
