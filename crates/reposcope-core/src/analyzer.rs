//! Wires configuration into the indexing, retrieval and assistant pipelines.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use reposcope_gateway::{AnalyzerService, BoxFuture, IndexSummary, SearchResult};
use reposcope_index::error::Result as IndexResult;
use reposcope_index::{
    CloneOutcome, IndexReport, RepoIndexer, RepositoryManager, Retriever, SearchHit, VectorStore,
};
use reposcope_llm::openai::OpenAiProvider;
use reposcope_llm::{
    AssistantApi, AssistantSession, ContextSnippet, Embedder, EmbeddingProvider, RateLimiter,
};

use crate::config::Config;

/// One provider instance per concern, sharing a single rate limiter.
pub struct Analyzer<P> {
    limiter: Arc<RateLimiter>,
    store: Arc<VectorStore>,
    indexer: RepoIndexer<P>,
    retriever: Retriever<P>,
    assistant: AssistantSession<P>,
    repository: RepositoryManager,
    top_k: usize,
    context_chunks: usize,
    cancel: CancellationToken,
}

impl Analyzer<OpenAiProvider> {
    /// Build an analyzer talking to the configured OpenAI endpoint.
    ///
    /// # Errors
    ///
    /// Fails without an API key, on invalid rate limits, or when an existing
    /// snapshot does not match `vector_db.embedding_dim`.
    pub async fn from_config(config: &Config, cancel: CancellationToken) -> anyhow::Result<Self> {
        let key = config.api_key()?;
        let client =
            reposcope_llm::http::default_client(Duration::from_secs(config.llm.timeout_secs));
        let provider = OpenAiProvider::new(
            key.expose().to_owned(),
            config.llm.base_url.clone(),
            config.llm.embedding_model.clone(),
        )
        .with_client(client);
        Self::with_provider(provider, config, cancel).await
    }
}

impl<P> Analyzer<P>
where
    P: EmbeddingProvider + AssistantApi + Clone,
{
    /// # Errors
    ///
    /// Fails on invalid rate limits or an incompatible snapshot.
    pub async fn with_provider(
        provider: P,
        config: &Config,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let limiter = Arc::new(
            RateLimiter::from_secs_f64(
                config.rate_limiter.max_rate,
                config.rate_limiter.time_period,
            )
            .context("invalid rate limiter settings")?,
        );
        let store = Arc::new(
            VectorStore::open(&config.vector_db.index_path, config.vector_db.embedding_dim)
                .await
                .with_context(|| {
                    format!("failed to open vector store {}", config.vector_db.index_path)
                })?,
        );
        let embedder = Arc::new(
            Embedder::new(provider.clone(), Arc::clone(&limiter))
                .with_max_retries(config.llm.max_retries),
        );
        let assistant =
            AssistantSession::new(provider, Arc::clone(&limiter), config.assistant.profile())
                .with_poll_policy(config.assistant.poll_policy())
                .with_max_retries(config.llm.max_retries);

        tracing::info!(
            vectors = store.len(),
            dimension = store.dimension(),
            max_rate = limiter.max_rate(),
            "analyzer ready"
        );

        Ok(Self {
            indexer: RepoIndexer::new(
                Arc::clone(&embedder),
                Arc::clone(&store),
                config.indexer_config(),
            ),
            retriever: Retriever::new(embedder, Arc::clone(&store)),
            assistant,
            repository: RepositoryManager::new(
                config.repository.url.clone(),
                &config.repository.path,
            ),
            top_k: config.vector_db.top_k,
            context_chunks: config.assistant.context_chunks,
            limiter,
            store,
            cancel,
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    #[must_use]
    pub fn assistant(&self) -> &AssistantSession<P> {
        &self.assistant
    }

    #[must_use]
    pub fn repository(&self) -> &RepositoryManager {
        &self.repository
    }

    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// # Errors
    ///
    /// Returns an error if embedding the query fails.
    pub async fn search(&self, query: &str, top_k: usize) -> IndexResult<Vec<SearchHit>> {
        self.retriever.search(query, top_k).await
    }

    /// Answer `question` with the closest indexed chunks attached as context.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or any assistant step fails.
    pub async fn ask(&self, question: &str) -> IndexResult<String> {
        let hits = self.retriever.search(question, self.context_chunks).await?;
        let context: Vec<ContextSnippet> = hits
            .into_iter()
            .map(|hit| ContextSnippet {
                label: hit.chunk.label(),
                text: hit.chunk.text,
            })
            .collect();
        tracing::debug!(context = context.len(), "asking assistant");
        Ok(self.assistant.query_with_context(question, &context).await?)
    }

    /// # Errors
    ///
    /// See [`RepositoryManager::clone_repository`].
    pub async fn clone_repository(&self) -> IndexResult<CloneOutcome> {
        self.repository.clone_repository().await
    }

    /// Clone the configured repository if needed, then index its checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if cloning fails or the snapshot cannot be persisted.
    pub async fn index_repository(&self) -> IndexResult<IndexReport> {
        if self.repository.url().is_some() {
            self.clone_repository().await?;
        }
        self.index_path(self.repository.path()).await
    }

    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be persisted.
    pub async fn index_path(&self, root: &Path) -> IndexResult<IndexReport> {
        self.indexer.index_repository(root, &self.cancel).await
    }
}

impl<P> AnalyzerService for Analyzer<P>
where
    P: EmbeddingProvider + AssistantApi + Clone + 'static,
{
    fn search(&self, query: String) -> BoxFuture<'_, anyhow::Result<Vec<SearchResult>>> {
        Box::pin(async move {
            let hits = Analyzer::search(self, &query, self.top_k).await?;
            Ok(hits
                .into_iter()
                .map(|hit| SearchResult {
                    text: hit.chunk.text,
                    distance: hit.distance,
                })
                .collect())
        })
    }

    fn ask(&self, query: String) -> BoxFuture<'_, anyhow::Result<String>> {
        Box::pin(async move { Ok(Analyzer::ask(self, &query).await?) })
    }

    fn index_repository(&self) -> BoxFuture<'_, anyhow::Result<IndexSummary>> {
        Box::pin(async move {
            let report = Analyzer::index_repository(self).await?;
            Ok(IndexSummary {
                files_indexed: report.files_indexed,
                files_failed: report.files_failed(),
                chunks_indexed: report.chunks_indexed,
            })
        })
    }
}
