use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// A remote capability that turns one string into one embedding vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single input string.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails or yields no vector.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn name(&self) -> &str;
}

/// Identity registered for a remote assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantProfile {
    pub name: String,
    pub instructions: String,
    pub model: String,
}

impl Default for AssistantProfile {
    fn default() -> Self {
        Self {
            name: "Code Analysis Assistant".into(),
            instructions: "You are a code analysis assistant. Help users understand and query \
                           repository code."
                .into(),
            model: "gpt-4-turbo".into(),
        }
    }
}

/// Lifecycle states reported for an assistant run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the run will never change state again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Failed | Self::Incomplete | Self::Expired
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

/// Remote assistant conversation API: assistants, threads, messages and runs.
pub trait AssistantApi: Send + Sync {
    /// Register an assistant and return its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    fn create_assistant(
        &self,
        profile: &AssistantProfile,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Open a new conversation thread and return its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    fn create_thread(&self) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Append a user message to a thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    fn add_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> impl Future<Output = Result<(), LlmError>> + Send;

    /// Start a run of `assistant_id` over the thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> impl Future<Output = Result<Run, LlmError>> + Send;

    /// Fetch the current state of a run.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    fn retrieve_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> impl Future<Output = Result<Run, LlmError>> + Send;

    /// Text of the newest message on the thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails or the thread has no text message.
    fn latest_message(&self, thread_id: &str)
    -> impl Future<Output = Result<String, LlmError>> + Send;
}
