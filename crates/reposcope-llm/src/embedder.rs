use std::sync::Arc;

use crate::error::LlmError;
use crate::provider::EmbeddingProvider;
use crate::rate_limit::RateLimiter;
use crate::retry::with_rate_limit;

/// Rate-limited front for an [`EmbeddingProvider`].
///
/// Every call, retries included, passes through the shared limiter.
#[derive(Debug)]
pub struct Embedder<P> {
    provider: P,
    limiter: Arc<RateLimiter>,
    max_retries: u32,
}

impl<P: EmbeddingProvider> Embedder<P> {
    #[must_use]
    pub fn new(provider: P, limiter: Arc<RateLimiter>) -> Self {
        Self {
            provider,
            limiter,
            max_retries: 0,
        }
    }

    /// Retry up to `max_retries` times when the remote reports a rate limit.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Embed one chunk of text.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error after retries are exhausted.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let embedding = with_rate_limit(&self.limiter, self.max_retries, "embedding", || {
            self.provider.embed(text)
        })
        .await?;
        tracing::trace!(
            provider = self.provider.name(),
            dim = embedding.len(),
            "embedded text"
        );
        Ok(embedding)
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }
}
