//! Test-only scripted provider for embeddings and assistant runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{AssistantApi, AssistantProfile, EmbeddingProvider, Run, RunStatus};

#[derive(Debug, Clone)]
pub struct MockProvider {
    pub dimension: usize,
    /// Inputs containing this marker fail to embed.
    pub fail_marker: Option<String>,
    pub answer: String,
    /// Milliseconds to sleep before each embedding.
    pub delay_ms: u64,
    statuses: Arc<Mutex<VecDeque<RunStatus>>>,
    embed_calls: Arc<AtomicUsize>,
    assistants_created: Arc<AtomicUsize>,
    messages: Arc<Mutex<Vec<String>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            dimension: 8,
            fail_marker: None,
            answer: "mock answer".into(),
            delay_ms: 0,
            statuses: Arc::new(Mutex::new(VecDeque::from([RunStatus::Completed]))),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            assistants_created: Arc::new(AtomicUsize::new(0)),
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = answer.into();
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Statuses returned by successive run calls; the last one repeats.
    #[must_use]
    pub fn with_run_statuses(self, statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into_iter().collect();
        self
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn assistants_created(&self) -> usize {
        self.assistants_created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// Deterministic embedding: byte histogram folded into `dimension` buckets.
    #[must_use]
    pub fn embedding_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return v;
        }
        for b in text.bytes() {
            v[usize::from(b) % self.dimension] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }

    fn next_run(&self) -> Run {
        let mut q = self.statuses.lock().unwrap();
        let status = if q.len() > 1 {
            q.pop_front().unwrap_or(RunStatus::Completed)
        } else {
            q.front().copied().unwrap_or(RunStatus::Completed)
        };
        Run {
            id: "run_mock".into(),
            status,
            last_error: None,
        }
    }
}

impl EmbeddingProvider for MockProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if let Some(marker) = &self.fail_marker
            && text.contains(marker.as_str())
        {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        Ok(self.embedding_for(text))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

impl AssistantApi for MockProvider {
    async fn create_assistant(&self, _profile: &AssistantProfile) -> Result<String, LlmError> {
        let n = self.assistants_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("asst_mock_{n}"))
    }

    async fn create_thread(&self) -> Result<String, LlmError> {
        Ok("thread_mock".into())
    }

    async fn add_message(&self, _thread_id: &str, content: &str) -> Result<(), LlmError> {
        self.messages.lock().unwrap().push(content.to_owned());
        Ok(())
    }

    async fn create_run(&self, _thread_id: &str, _assistant_id: &str) -> Result<Run, LlmError> {
        Ok(self.next_run())
    }

    async fn retrieve_run(&self, _thread_id: &str, _run_id: &str) -> Result<Run, LlmError> {
        Ok(self.next_run())
    }

    async fn latest_message(&self, _thread_id: &str) -> Result<String, LlmError> {
        Ok(self.answer.clone())
    }
}
