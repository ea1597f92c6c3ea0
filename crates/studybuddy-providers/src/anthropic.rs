//! Anthropic API provider implementation.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use studybuddy_core::traits::{
    GenerationProvider, GenerationReply, GenerationRequest, ModelInfo, TokenUsage,
};

use crate::error::ProviderError;
use crate::http::{build_client, check_status, decode, send_error};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const API_VERSION: &str = "2023-06-01";

/// Anthropic API provider.
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: build_client(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// The Messages API has no schema parameter; the schema rides in the system prompt.
fn system_with_schema(request: &GenerationRequest) -> String {
    format!(
        "{}\n\nReply with a single JSON object and nothing else. It must match this JSON Schema:\n{}",
        request.system_prompt, request.schema.schema
    )
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: String,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: AnthropicUsage,
    model: String,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[async_trait]
impl GenerationProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, request), fields(feature = %request.feature))]
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReply, ProviderError> {
        let start = Instant::now();
        let model = request.model.as_deref().unwrap_or(DEFAULT_MODEL);

        let body = AnthropicRequest {
            model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: system_with_schema(request),
            messages: vec![AnthropicMessage {
                role: "user",
                content: &request.user_prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, DEFAULT_TIMEOUT_SECS))?;
        let response = check_status(response, model).await?;
        let api_response: AnthropicResponse = decode(response).await?;

        let content = api_response
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");
        let usage = api_response.usage;

        Ok(GenerationReply {
            content,
            model: api_response.model,
            token_usage: TokenUsage {
                prompt_tokens: usage.input_tokens,
                completion_tokens: usage.output_tokens,
                total_tokens: usage.input_tokens + usage.output_tokens,
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "claude-sonnet-4-20250514".into(),
                name: "Claude Sonnet 4".into(),
                provider: "anthropic".into(),
                max_context: 200_000,
            },
            ModelInfo {
                id: "claude-haiku-4-5-20251001".into(),
                name: "Claude Haiku 4.5".into(),
                provider: "anthropic".into(),
                max_context: 200_000,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studybuddy_core::model::Feature;
    use studybuddy_core::traits::ReplySchema;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            Feature::PracticeProblems,
            "You are an educator.",
            "Create 2 practice problems",
            ReplySchema::practice_problems(),
        )
    }

    #[test]
    fn schema_is_embedded_in_system_prompt() {
        let system = system_with_schema(&request());
        assert!(system.starts_with("You are an educator."));
        assert!(system.contains("\"question_text\""));
    }

    #[tokio::test]
    async fn successful_generation() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "content": [{"type": "text", "text": "{\"problems\": []}"}],
            "model": "claude-sonnet-4-20250514",
            "usage": {"input_tokens": 50, "output_tokens": 20}
        });

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("test-key", Some(server.uri()));
        let reply = provider.generate(&request()).await.unwrap();
        assert_eq!(reply.content, "{\"problems\": []}");
        assert_eq!(reply.token_usage.prompt_tokens, 50);
        assert_eq!(reply.token_usage.completion_tokens, 20);
        assert_eq!(reply.token_usage.total_tokens, 70);
    }

    #[tokio::test]
    async fn authentication_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("bad-key", Some(server.uri()));
        let err = provider.generate(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn rate_limiting() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("test-key", Some(server.uri()));
        let err = provider.generate(&request()).await.unwrap_err();
        assert_eq!(err.retry_after_ms(), Some(7000));
    }

    #[tokio::test]
    async fn api_error_message_is_extracted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "invalid_request_error", "message": "max_tokens: too large"}
            })))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("test-key", Some(server.uri()));
        let err = provider.generate(&request()).await.unwrap_err();
        match err {
            ProviderError::ApiError { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "max_tokens: too large");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
