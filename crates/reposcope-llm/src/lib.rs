//! Remote model access for reposcope: a shared token-bucket rate limiter, the
//! OpenAI embeddings and assistants REST client, and the session types built
//! on top of them.

pub mod assistant;
pub mod embedder;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod rate_limit;
pub(crate) mod retry;

pub use assistant::{AssistantSession, ContextSnippet, PollPolicy, SessionState, ThreadId};
pub use embedder::Embedder;
pub use error::LlmError;
pub use provider::{AssistantApi, AssistantProfile, EmbeddingProvider, Run, RunStatus};
pub use rate_limit::{RateLimiter, RatePermit};
