use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::secret::Secret;
use reposcope_index::IndexerConfig;
use reposcope_llm::{AssistantProfile, PollPolicy};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<Secret>,
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_max_rate() -> u32 {
    10
}

fn default_time_period() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimiterConfig {
    #[serde(default = "default_max_rate")]
    pub max_rate: u32,
    /// Window length in seconds.
    #[serde(default = "default_time_period")]
    pub time_period: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_rate: default_max_rate(),
            time_period: default_time_period(),
        }
    }
}

fn default_embedding_dim() -> usize {
    1536
}

fn default_chunk_size() -> usize {
    500
}

fn default_index_path() -> String {
    "vectorstore.index".into()
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorDbConfig {
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_index_path")]
    pub index_path: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            embedding_dim: default_embedding_dim(),
            chunk_size: default_chunk_size(),
            index_path: default_index_path(),
            top_k: default_top_k(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Extra attempts after a 429; 0 disables retrying.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_assistant_name() -> String {
    AssistantProfile::default().name
}

fn default_assistant_instructions() -> String {
    AssistantProfile::default().instructions
}

fn default_assistant_model() -> String {
    AssistantProfile::default().model
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_poll_interval_ms() -> u64 {
    8000
}

fn default_max_wait_secs() -> u64 {
    300
}

fn default_context_chunks() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_name")]
    pub name: String,
    #[serde(default = "default_assistant_instructions")]
    pub instructions: String,
    #[serde(default = "default_assistant_model")]
    pub model: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    /// Retrieved chunks relayed with each question; 0 sends the bare question.
    #[serde(default = "default_context_chunks")]
    pub context_chunks: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            instructions: default_assistant_instructions(),
            model: default_assistant_model(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
            context_chunks: default_context_chunks(),
        }
    }
}

impl AssistantConfig {
    #[must_use]
    pub fn profile(&self) -> AssistantProfile {
        AssistantProfile {
            name: self.name.clone(),
            instructions: self.instructions.clone(),
            model: self.model.clone(),
        }
    }

    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(self.poll_interval_ms),
            max_interval: Duration::from_millis(self.max_poll_interval_ms),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }
}

fn default_extensions() -> Vec<String> {
    IndexerConfig::default().extensions
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub respect_gitignore: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            respect_gitignore: false,
        }
    }
}

fn default_repo_path() -> String {
    "repo".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_repo_path")]
    pub path: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: default_repo_path(),
        }
    }
}

fn default_gateway_bind() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    5000
}

fn default_gateway_max_body() -> usize {
    1_048_576
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default = "default_gateway_max_body")]
    pub max_body_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            max_body_size: default_gateway_max_body(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            chunk_size: self.vector_db.chunk_size,
            extensions: self.index.extensions.clone(),
            respect_gitignore: self.index.respect_gitignore,
        }
    }
}
