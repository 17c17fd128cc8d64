//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use sdsynth_shared::{LlmConfig, Result, SynthError};

use crate::{CompletionRequest, LlmBackend};

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("sdsynth/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body carried into an error message.
const MAX_ERROR_BODY: usize = 500;

/// HTTP client for `POST {base_url}/chat/completions`.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    api_key: String,
    endpoint: String,
    client: Client,
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    /// Build a client for the configured endpoint.
    ///
    /// The credential is checked here, before any call is attempted.
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SynthError::config(format!(
                "backend API key is empty. Set the {} environment variable.",
                config.api_key_env
            )));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SynthError::Backend(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmBackend for ChatCompletionsClient {
    #[instrument(skip_all, fields(model = %request.model, max_tokens = request.max_tokens))]
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SynthError::Backend(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(SynthError::Backend(format!("HTTP {status}: {body}")));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| SynthError::Backend(format!("failed to decode response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SynthError::Backend("response contained no choices".into()))?;

        if content.trim().is_empty() {
            return Err(SynthError::Backend("backend returned an empty completion".into()));
        }

        debug!(bytes = content.len(), "completion received");
        Ok(content)
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: format!("{}/openai/v1/", server.uri()),
            timeout_secs: 5,
            ..LlmConfig::default()
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("llama-3.1-8b-instant", 0.0, 60)
            .message(ChatMessage::system("classify"))
            .message(ChatMessage::user("Document Text:\nhello"))
    }

    #[test]
    fn empty_api_key_is_rejected_before_any_call() {
        let err = ChatCompletionsClient::new("  ", &LlmConfig::default()).unwrap_err();
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let client = ChatCompletionsClient::new("k", &LlmConfig::default()).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama-3.1-8b-instant",
                "max_tokens": 60,
                "messages": [{"role": "system", "content": "classify"}, {"role": "user", "content": "Document Text:\nhello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "VALID"}}]
            })))
            .mount(&server)
            .await;

        let client = ChatCompletionsClient::new("test-key", &config_for(&server)).unwrap();
        let text = client.complete(request()).await.unwrap();
        assert_eq!(text, "VALID");
    }

    #[tokio::test]
    async fn http_error_status_is_a_backend_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let client = ChatCompletionsClient::new("bad", &config_for(&server)).unwrap();
        let err = client.complete(request()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("invalid api key"));
    }

    #[tokio::test]
    async fn no_choices_is_a_backend_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let client = ChatCompletionsClient::new("k", &config_for(&server)).unwrap();
        let err = client.complete(request()).await.unwrap_err();
        assert!(matches!(err, SynthError::Backend(_)));
    }

    #[tokio::test]
    async fn undecodable_body_is_a_backend_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = ChatCompletionsClient::new("k", &config_for(&server)).unwrap();
        let err = client.complete(request()).await.unwrap_err();
        assert!(err.to_string().contains("decode"));
    }
}
