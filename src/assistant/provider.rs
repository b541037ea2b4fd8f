//! Remote assistant service boundary.
//!
//! The `AssistantProvider` trait covers the six remote operations the core
//! needs: assistant create/retrieve/delete, thread create/retrieve, message
//! create, run create/retrieve, message list. The production implementation
//! talks to the OpenAI Assistants v2 API over HTTP; tests substitute mock
//! providers behind the same trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors crossing the provider boundary
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote resource does not exist (deleted, expired, wrong id)
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport-level failure (connect, TLS, body read)
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote API rejected the request
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Assistant identity settings, as created remotely
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantSpec {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_temperature() -> f64 {
    1.0
}

/// Response format preference for assistant output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Auto,
    Json,
}

/// Terminal and in-flight run states reported by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    /// Unrecognized status string; treated as in-flight
    #[serde(other)]
    Other,
}

impl RunState {
    /// Whether this state ends the poll loop
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired
        )
    }
}

/// A point-in-time view of a run's status
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub state: RunState,
    /// Server-reported error detail, if any
    pub last_error: Option<String>,
}

/// One message on a thread, as returned by the message-list endpoint.
///
/// Messages keep the provider's list order (typically newest first); the
/// executor never re-sorts them.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub role: String,
    /// Text content parts in list order
    pub text_parts: Vec<String>,
}

impl ThreadMessage {
    /// Concatenated text of all parts, in list order
    pub fn text(&self) -> String {
        self.text_parts.concat()
    }
}

/// Remote operations the session manager and executor depend on
#[async_trait]
pub trait AssistantProvider: Send + Sync {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<String, ProviderError>;

    /// Existence check; Ok(()) means the id is valid remotely
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<(), ProviderError>;

    async fn delete_assistant(&self, assistant_id: &str) -> Result<(), ProviderError>;

    async fn create_thread(&self) -> Result<String, ProviderError>;

    /// Existence check; Ok(()) means the id is valid remotely
    async fn retrieve_thread(&self, thread_id: &str) -> Result<(), ProviderError>;

    /// Append a user message to a thread
    async fn create_message(&self, thread_id: &str, content: &str) -> Result<(), ProviderError>;

    /// Start a run of the assistant against the thread; returns the run id
    async fn create_run(&self, thread_id: &str, assistant_id: &str)
        -> Result<String, ProviderError>;

    async fn retrieve_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunSnapshot, ProviderError>;

    /// List messages in the provider's default order (newest first)
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ProviderError>;
}

// ============================================================================
// OpenAI Assistants v2 implementation
// ============================================================================

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// reqwest-backed provider for the OpenAI Assistants v2 API
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    status: RunState,
    #[serde(default)]
    last_error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    data: Vec<MessageEnvelope>,
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

impl OpenAiProvider {
    /// Create a provider with the default API endpoint
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Create a provider against a custom endpoint (proxies, test servers)
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Read the API key from `OPENAI_API_KEY`
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| ProviderError::Api {
            status: 401,
            message: "OPENAI_API_KEY is not set".to_string(),
        })?;
        Ok(Self::new(api_key))
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.api_url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Map non-success responses to ProviderError, passing success through
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            Err(ProviderError::NotFound(message))
        } else {
            Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl AssistantProvider for OpenAiProvider {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<String, ProviderError> {
        let response_format = match spec.response_format {
            ResponseFormat::Auto => Value::String("auto".to_string()),
            ResponseFormat::Json => serde_json::json!({ "type": "json_object" }),
        };

        let body = serde_json::json!({
            "name": spec.name,
            "instructions": spec.instructions,
            "tools": spec.tools,
            "model": spec.model,
            "response_format": response_format,
            "temperature": spec.temperature,
        });

        let response = self
            .request(reqwest::Method::POST, "assistants")
            .json(&body)
            .send()
            .await?;

        let created: IdResponse = Self::check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<(), ProviderError> {
        let response = self
            .request(reqwest::Method::GET, &format!("assistants/{}", assistant_id))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn delete_assistant(&self, assistant_id: &str) -> Result<(), ProviderError> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("assistants/{}", assistant_id),
            )
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn create_thread(&self) -> Result<String, ProviderError> {
        let response = self
            .request(reqwest::Method::POST, "threads")
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let created: IdResponse = Self::check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn retrieve_thread(&self, thread_id: &str) -> Result<(), ProviderError> {
        let response = self
            .request(reqwest::Method::GET, &format!("threads/{}", thread_id))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<(), ProviderError> {
        let body = serde_json::json!({
            "role": "user",
            "content": content,
        });

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("threads/{}/messages", thread_id),
            )
            .json(&body)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({ "assistant_id": assistant_id });

        let response = self
            .request(reqwest::Method::POST, &format!("threads/{}/runs", thread_id))
            .json(&body)
            .send()
            .await?;

        let created: IdResponse = Self::check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn retrieve_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunSnapshot, ProviderError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("threads/{}/runs/{}", thread_id, run_id),
            )
            .send()
            .await?;

        let run: RunResponse = Self::check(response).await?.json().await?;

        let last_error = run.last_error.map(|e| {
            format!(
                "{}: {}",
                e.code.unwrap_or_else(|| "unknown".to_string()),
                e.message.unwrap_or_default()
            )
        });

        Ok(RunSnapshot {
            state: run.status,
            last_error,
        })
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ProviderError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("threads/{}/messages", thread_id),
            )
            .send()
            .await?;

        let list: MessageListResponse = Self::check(response).await?.json().await?;

        // Keep the API's order; extract text parts only
        let messages = list
            .data
            .into_iter()
            .map(|m| ThreadMessage {
                role: m.role,
                text_parts: m
                    .content
                    .into_iter()
                    .filter(|p| p.kind == "text")
                    .filter_map(|p| p.text.map(|t| t.value))
                    .collect(),
            })
            .collect();

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let provider = OpenAiProvider::with_base_url(
            "KEY".to_string(),
            "https://api.example.com/v1/".to_string(),
        );
        assert_eq!(
            provider.api_url("threads/t_1/messages"),
            "https://api.example.com/v1/threads/t_1/messages"
        );
    }

    #[test]
    fn test_run_state_terminal() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(RunState::Expired.is_terminal());
        assert!(!RunState::Queued.is_terminal());
        assert!(!RunState::InProgress.is_terminal());
        assert!(!RunState::Other.is_terminal());
    }

    #[test]
    fn test_run_response_parsing() {
        let json = r#"{
            "id": "run_abc",
            "status": "failed",
            "last_error": { "code": "rate_limit_exceeded", "message": "slow down" }
        }"#;

        let run: RunResponse = serde_json::from_str(json).unwrap();
        assert_eq!(run.status, RunState::Failed);
        assert_eq!(
            run.last_error.unwrap().message.as_deref(),
            Some("slow down")
        );
    }

    #[test]
    fn test_unknown_status_maps_to_other() {
        let run: RunResponse =
            serde_json::from_str(r#"{ "status": "incubating" }"#).unwrap();
        assert_eq!(run.status, RunState::Other);
    }

    #[test]
    fn test_message_text_concatenates_parts_in_order() {
        let message = ThreadMessage {
            role: "assistant".to_string(),
            text_parts: vec!["first ".to_string(), "second".to_string()],
        };
        assert_eq!(message.text(), "first second");
    }

    #[test]
    fn test_message_list_parsing_skips_non_text_parts() {
        let json = r#"{
            "data": [
                {
                    "role": "assistant",
                    "content": [
                        { "type": "image_file", "image_file": { "file_id": "f_1" } },
                        { "type": "text", "text": { "value": "hello" } }
                    ]
                }
            ]
        }"#;

        let list: MessageListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(list.data.len(), 1);
        let parts: Vec<String> = list.data[0]
            .content
            .iter()
            .filter(|p| p.kind == "text")
            .filter_map(|p| p.text.as_ref().map(|t| t.value.clone()))
            .collect();
        assert_eq!(parts, vec!["hello".to_string()]);
    }
}
