use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One search hit as returned over HTTP.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub text: String,
    pub distance: f32,
}

/// Counts reported after a re-index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks_indexed: usize,
}

/// Operations the HTTP handlers delegate to.
pub trait AnalyzerService: Send + Sync {
    fn search(&self, query: String) -> BoxFuture<'_, anyhow::Result<Vec<SearchResult>>>;

    fn ask(&self, query: String) -> BoxFuture<'_, anyhow::Result<String>>;

    fn index_repository(&self) -> BoxFuture<'_, anyhow::Result<IndexSummary>>;
}
