use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{AssistantApi, AssistantProfile, EmbeddingProvider, Run};
use crate::retry::retry_after;

const PROVIDER: &str = "openai";
const ASSISTANTS_BETA: &str = "assistants=v2";

#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(api_key: String, mut base_url: String, embedding_model: String) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(Duration::from_secs(60)),
            api_key,
            base_url,
            embedding_model,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<String, LlmError> {
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited {
                retry_after: retry_after(&response),
            });
        }

        let text = response.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            tracing::error!("OpenAI {what} error {status}: {text}");
            return Err(LlmError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message: api_error_message(&text).unwrap_or_else(|| format!("{what} failed")),
            });
        }

        Ok(text)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, LlmError> {
        let text = self.send(request, what).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Extract `error.message` from an OpenAI error body.
fn api_error_message(body: &str) -> Option<String> {
    let parsed: ApiErrorBody = serde_json::from_str(body).ok()?;
    Some(parsed.error.message)
}

impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = EmbeddingRequest {
            input: text,
            model: &self.embedding_model,
        };

        let resp: EmbeddingResponse = self
            .send_json(self.post("/embeddings").json(&body), "embedding request")
            .await?;

        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyResponse { provider: PROVIDER })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        PROVIDER
    }
}

impl AssistantApi for OpenAiProvider {
    async fn create_assistant(&self, profile: &AssistantProfile) -> Result<String, LlmError> {
        let body = CreateAssistantRequest {
            name: &profile.name,
            instructions: &profile.instructions,
            model: &profile.model,
            tools: [ToolSpec {
                r#type: "code_interpreter",
            }],
        };
        let created: ObjectId = self
            .send_json(
                self.post("/assistants")
                    .header("OpenAI-Beta", ASSISTANTS_BETA)
                    .json(&body),
                "create assistant",
            )
            .await?;
        tracing::debug!(assistant_id = %created.id, "assistant created");
        Ok(created.id)
    }

    async fn create_thread(&self) -> Result<String, LlmError> {
        let created: ObjectId = self
            .send_json(
                self.post("/threads")
                    .header("OpenAI-Beta", ASSISTANTS_BETA)
                    .json(&serde_json::json!({})),
                "create thread",
            )
            .await?;
        Ok(created.id)
    }

    async fn add_message(&self, thread_id: &str, content: &str) -> Result<(), LlmError> {
        let body = CreateMessageRequest {
            role: "user",
            content,
        };
        self.send(
            self.post(&format!("/threads/{thread_id}/messages"))
                .header("OpenAI-Beta", ASSISTANTS_BETA)
                .json(&body),
            "create message",
        )
        .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, LlmError> {
        let body = CreateRunRequest { assistant_id };
        self.send_json(
            self.post(&format!("/threads/{thread_id}/runs"))
                .header("OpenAI-Beta", ASSISTANTS_BETA)
                .json(&body),
            "create run",
        )
        .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, LlmError> {
        self.send_json(
            self.get(&format!("/threads/{thread_id}/runs/{run_id}"))
                .header("OpenAI-Beta", ASSISTANTS_BETA),
            "retrieve run",
        )
        .await
    }

    async fn latest_message(&self, thread_id: &str) -> Result<String, LlmError> {
        let list: MessageList = self
            .send_json(
                self.get(&format!("/threads/{thread_id}/messages?order=desc&limit=1"))
                    .header("OpenAI-Beta", ASSISTANTS_BETA),
                "list messages",
            )
            .await?;

        list.data
            .into_iter()
            .next()
            .and_then(|msg| {
                msg.content.into_iter().find_map(|part| match part {
                    MessageContent::Text { text } => Some(text.value),
                    MessageContent::Other => None,
                })
            })
            .ok_or(LlmError::EmptyResponse { provider: PROVIDER })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ToolSpec {
    r#type: &'static str,
}

#[derive(Serialize)]
struct CreateAssistantRequest<'a> {
    name: &'a str,
    instructions: &'a str,
    model: &'a str,
    tools: [ToolSpec; 1],
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Deserialize)]
struct ObjectId {
    id: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text {
        text: TextValue,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TextValue {
    value: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::provider::RunStatus;

    fn test_provider(base_url: &str) -> OpenAiProvider {
        OpenAiProvider::new(
            "sk-test-key".into(),
            base_url.into(),
            "text-embedding-3-small".into(),
        )
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let p = test_provider("https://api.openai.com/v1/");
        assert_eq!(p.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let p = test_provider("https://api.openai.com/v1");
        let debug = format!("{p:?}");
        assert!(!debug.contains("sk-test-key"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("text-embedding-3-small"));
    }

    #[test]
    fn name_returns_openai() {
        assert_eq!(test_provider("http://x").name(), "openai");
    }

    #[test]
    fn embedding_request_serialization() {
        let body = EmbeddingRequest {
            input: "hello world",
            model: "text-embedding-3-small",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"input\":\"hello world\""));
        assert!(json.contains("\"model\":\"text-embedding-3-small\""));
    }

    #[test]
    fn embedding_response_empty_data() {
        let resp: EmbeddingResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(resp.data.is_empty());
    }

    #[test]
    fn assistant_request_includes_code_interpreter() {
        let body = CreateAssistantRequest {
            name: "n",
            instructions: "i",
            model: "gpt-4-turbo",
            tools: [ToolSpec {
                r#type: "code_interpreter",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["tools"][0]["type"], "code_interpreter");
    }

    #[test]
    fn message_content_skips_non_text_parts() {
        let json = r#"{"data":[{"content":[
            {"type":"image_file","image_file":{"file_id":"f"}},
            {"type":"text","text":{"value":"answer","annotations":[]}}
        ]}]}"#;
        let list: MessageList = serde_json::from_str(json).unwrap();
        let content = &list.data[0].content;
        assert!(matches!(content[0], MessageContent::Other));
        assert!(matches!(&content[1], MessageContent::Text { text } if text.value == "answer"));
    }

    #[test]
    fn api_error_message_parses_openai_shape() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            api_error_message(body).as_deref(),
            Some("Incorrect API key provided")
        );
        assert!(api_error_message("not json").is_none());
    }

    #[tokio::test]
    async fn embed_returns_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test-key"))
            .and(body_json(serde_json::json!({
                "input": "fn main() {}",
                "model": "text-embedding-3-small"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.25, -0.5, 1.0]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = test_provider(&server.uri());
        let v = p.embed("fn main() {}").await.unwrap();
        assert_eq!(v, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn embed_empty_data_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let err = test_provider(&server.uri()).embed("x").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { provider: "openai" }));
    }

    #[tokio::test]
    async fn embed_api_error_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .mount(&server)
            .await;

        let err = test_provider(&server.uri()).embed("x").await.unwrap_err();
        match err {
            LlmError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 401);
                assert!(message.contains("Incorrect API key"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn embed_429_maps_to_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = test_provider(&server.uri()).embed("x").await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::RateLimited {
                retry_after: Some(d)
            } if d == Duration::from_secs(7)
        ));
    }

    #[tokio::test]
    async fn embed_unreachable_endpoint_errors() {
        let p = test_provider("http://127.0.0.1:1");
        assert!(matches!(p.embed("test").await, Err(LlmError::Http(_))));
    }

    #[tokio::test]
    async fn assistant_round_trip_wire_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assistants"))
            .and(header("openai-beta", "assistants=v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "asst_1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "thread_1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/threads/thread_1/messages"))
            .and(body_json(serde_json::json!({"role": "user", "content": "why?"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "msg_1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/threads/thread_1/runs"))
            .and(body_json(serde_json::json!({"assistant_id": "asst_1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "run_1", "status": "queued"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_1/runs/run_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "run_1", "status": "completed"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_1/messages"))
            .and(query_param("order", "desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"content": [{"type": "text", "text": {"value": "because"}}]}]
            })))
            .mount(&server)
            .await;

        let p = test_provider(&server.uri());
        let assistant_id = p.create_assistant(&AssistantProfile::default()).await.unwrap();
        assert_eq!(assistant_id, "asst_1");
        let thread = p.create_thread().await.unwrap();
        assert_eq!(thread, "thread_1");
        p.add_message(&thread, "why?").await.unwrap();
        let run = p.create_run(&thread, &assistant_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        let run = p.retrieve_run(&thread, &run.id).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(p.latest_message(&thread).await.unwrap(), "because");
    }

    #[tokio::test]
    async fn latest_message_without_text_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/t/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let err = test_provider(&server.uri())
            .latest_message("t")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }

    #[tokio::test]
    #[ignore = "requires REPOSCOPE_OPENAI_API_KEY env var"]
    async fn integration_openai_embed() {
        let api_key = std::env::var("REPOSCOPE_OPENAI_API_KEY")
            .expect("REPOSCOPE_OPENAI_API_KEY must be set");
        let provider = OpenAiProvider::new(
            api_key,
            "https://api.openai.com/v1".into(),
            "text-embedding-3-small".into(),
        );
        let v = provider.embed("hello").await.unwrap();
        assert_eq!(v.len(), 1536);
    }
}
