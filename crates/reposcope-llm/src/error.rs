use std::time::Duration;

use crate::provider::RunStatus;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{provider} API request failed (status {status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("invalid rate limiter configuration: {0}")]
    InvalidRateLimit(String),

    #[error("assistant has not been created yet")]
    AssistantNotCreated,

    #[error("run {run_id} ended with status {status}: {message}")]
    RunFailed {
        run_id: String,
        status: RunStatus,
        message: String,
    },

    #[error("run {run_id} did not complete within {waited_secs}s")]
    RunTimeout { run_id: String, waited_secs: u64 },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;
