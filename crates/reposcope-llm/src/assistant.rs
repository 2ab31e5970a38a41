//! Conversation session against a hosted assistant.
//!
//! A session owns at most one remote assistant identity. Threads are opened
//! on demand, and each question is answered by starting a run and polling it
//! until it reaches a terminal state.

use std::fmt;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::error::LlmError;
use crate::provider::{AssistantApi, AssistantProfile, Run, RunStatus};
use crate::rate_limit::RateLimiter;
use crate::retry::with_rate_limit;

/// Run polling schedule: exponential backoff bounded by a total wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(8),
            max_wait: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadId(String);

impl ThreadId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uncreated,
    Created,
    ThreadOpen,
    AwaitingRun,
    RunComplete,
}

/// A retrieved excerpt relayed to the assistant alongside a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnippet {
    /// Source label, e.g. `src/main.py#3`.
    pub label: String,
    pub text: String,
}

/// Build the user message for `question`, prefixed by any context excerpts.
#[must_use]
pub fn format_question(question: &str, context: &[ContextSnippet]) -> String {
    let mut out = String::new();
    if !context.is_empty() {
        out.push_str("Relevant excerpts from the repository:\n\n");
        for snippet in context {
            let _ = writeln!(out, "--- {} ---\n{}\n", snippet.label, snippet.text.trim_end());
        }
    }
    let _ = write!(
        out,
        "Answer this question: {question}. Provide clear, formatted code snippets in your \
         responses if needed."
    );
    out
}

pub struct AssistantSession<A> {
    api: A,
    limiter: Arc<RateLimiter>,
    profile: AssistantProfile,
    poll: PollPolicy,
    max_retries: u32,
    assistant_id: OnceCell<String>,
    state: Mutex<SessionState>,
}

impl<A> fmt::Debug for AssistantSession<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantSession")
            .field("profile", &self.profile)
            .field("poll", &self.poll)
            .field("assistant_id", &self.assistant_id.get())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<A> AssistantSession<A> {
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = state;
    }

    #[must_use]
    pub fn assistant_id(&self) -> Option<&str> {
        self.assistant_id.get().map(String::as_str)
    }

    #[must_use]
    pub fn profile(&self) -> &AssistantProfile {
        &self.profile
    }
}

impl<A: AssistantApi> AssistantSession<A> {
    #[must_use]
    pub fn new(api: A, limiter: Arc<RateLimiter>, profile: AssistantProfile) -> Self {
        Self {
            api,
            limiter,
            profile,
            poll: PollPolicy::default(),
            max_retries: 0,
            assistant_id: OnceCell::new(),
            state: Mutex::new(SessionState::Uncreated),
        }
    }

    #[must_use]
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Register the remote assistant, or return the id registered earlier.
    ///
    /// Concurrent callers share a single registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote registration fails; a later call retries it.
    pub async fn create(&self) -> Result<&str, LlmError> {
        let id = self
            .assistant_id
            .get_or_try_init(|| async {
                let id = with_rate_limit(&self.limiter, self.max_retries, "create assistant", || {
                    self.api.create_assistant(&self.profile)
                })
                .await?;
                tracing::info!(assistant_id = %id, name = %self.profile.name, "assistant registered");
                Ok::<_, LlmError>(id)
            })
            .await?;
        if self.state() == SessionState::Uncreated {
            self.set_state(SessionState::Created);
        }
        Ok(id.as_str())
    }

    /// Open a fresh remote conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    pub async fn open_thread(&self) -> Result<ThreadId, LlmError> {
        let id = with_rate_limit(&self.limiter, self.max_retries, "create thread", || {
            self.api.create_thread()
        })
        .await?;
        tracing::debug!(thread_id = %id, "thread opened");
        self.set_state(SessionState::ThreadOpen);
        Ok(ThreadId(id))
    }

    /// Ask `question` on `thread` and wait for the answer.
    ///
    /// # Errors
    ///
    /// See [`AssistantSession::ask_with_context`].
    pub async fn ask(&self, thread: &ThreadId, question: &str) -> Result<String, LlmError> {
        self.ask_with_context(thread, question, &[]).await
    }

    /// Post the question with context, start a run, poll it and return the
    /// newest message text.
    ///
    /// # Errors
    ///
    /// Returns `AssistantNotCreated` before [`AssistantSession::create`],
    /// `RunFailed` for a non-successful terminal run, `RunTimeout` when the
    /// poll budget is exhausted, or any remote error.
    pub async fn ask_with_context(
        &self,
        thread: &ThreadId,
        question: &str,
        context: &[ContextSnippet],
    ) -> Result<String, LlmError> {
        let assistant_id = self
            .assistant_id
            .get()
            .ok_or(LlmError::AssistantNotCreated)?;
        let content = format_question(question, context);

        self.call("create message", || self.api.add_message(thread.as_str(), &content))
            .await?;
        let run = self
            .call("create run", || self.api.create_run(thread.as_str(), assistant_id))
            .await?;
        self.set_state(SessionState::AwaitingRun);
        tracing::debug!(thread_id = %thread, run_id = %run.id, "run started");

        self.wait_for_run(thread, run).await?;
        self.set_state(SessionState::RunComplete);

        self.call("list messages", || self.api.latest_message(thread.as_str()))
            .await
    }

    /// Create (if needed), open a new thread and ask a single question.
    ///
    /// # Errors
    ///
    /// Propagates any error from the three steps.
    pub async fn query(&self, question: &str) -> Result<String, LlmError> {
        self.query_with_context(question, &[]).await
    }

    /// # Errors
    ///
    /// Propagates any error from creation, thread opening or the run.
    pub async fn query_with_context(
        &self,
        question: &str,
        context: &[ContextSnippet],
    ) -> Result<String, LlmError> {
        self.create().await?;
        let thread = self.open_thread().await?;
        self.ask_with_context(&thread, question, context).await
    }

    async fn call<T, F, Fut>(&self, caller: &str, f: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>>,
    {
        with_rate_limit(&self.limiter, self.max_retries, caller, f).await
    }

    async fn wait_for_run(&self, thread: &ThreadId, mut run: Run) -> Result<(), LlmError> {
        let deadline = Instant::now() + self.poll.max_wait;
        let mut interval = self.poll.initial_interval;

        loop {
            match run.status {
                RunStatus::Completed => return Ok(()),
                RunStatus::RequiresAction => {
                    return Err(LlmError::RunFailed {
                        run_id: run.id,
                        status: run.status,
                        message: "run requires tool outputs, which this session does not provide"
                            .into(),
                    });
                }
                status if status.is_terminal() => {
                    let message = run
                        .last_error
                        .map(|e| e.message)
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| format!("run {status}"));
                    tracing::warn!(run_id = %run.id, %status, "assistant run did not complete");
                    return Err(LlmError::RunFailed {
                        run_id: run.id,
                        status,
                        message,
                    });
                }
                _ => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LlmError::RunTimeout {
                    run_id: run.id,
                    waited_secs: self.poll.max_wait.as_secs(),
                });
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
            interval = (interval * 2).min(self.poll.max_interval);

            let run_id = run.id.clone();
            run = self
                .call("retrieve run", || {
                    self.api.retrieve_run(thread.as_str(), &run_id)
                })
                .await?;
            tracing::trace!(run_id = %run.id, status = %run.status, "polled run");
        }
    }
}
