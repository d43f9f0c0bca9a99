//! OpenAI-compatible chat completions adapter

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::style::{system_prompt, user_prompt};
use super::{parse_generated, DocumentGenerator, GeneratedDocument, StyleConfig, SummarizationError};
use crate::utils::http_client;

/// OpenAI API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// Request types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

// Response types

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    code: Option<String>,
}

/// Document generator backed by a chat completions endpoint
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(REQUEST_TIMEOUT),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_request(&self, transcript: &str, title: Option<&str>, style: &StyleConfig) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            response_format: ResponseFormat { kind: "json_object" },
            messages: vec![
                Message {
                    role: "system",
                    content: system_prompt(style),
                },
                Message {
                    role: "user",
                    content: user_prompt(transcript, title),
                },
            ],
        }
    }
}

fn classify_failure(status: StatusCode, body: &str) -> SummarizationError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return SummarizationError::RateLimited;
    }

    let api_error = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    if let Some(error) = &api_error {
        if error.code.as_deref() == Some("content_policy_violation") {
            return SummarizationError::ContentPolicy(error.message.clone());
        }
    }

    let message = api_error
        .map(|e| e.message)
        .unwrap_or_else(|| format!("HTTP {}", status));
    SummarizationError::Failed(message)
}

#[async_trait]
impl DocumentGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        transcript: &str,
        title: Option<&str>,
        style: &StyleConfig,
    ) -> Result<GeneratedDocument, SummarizationError> {
        let request = self.build_request(transcript, title, style);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SummarizationError::Failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "Generation request failed");
            return Err(classify_failure(status, &body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| SummarizationError::Parse(e.to_string()))?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SummarizationError::Parse("response has no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(SummarizationError::ContentPolicy(
                "response withheld by content filter".to_string(),
            ));
        }

        let raw = choice
            .message
            .content
            .ok_or_else(|| SummarizationError::Parse("response has no content".to_string()))?;

        parse_generated(&raw).inspect_err(|e| {
            tracing::debug!(error = %e, raw = %raw, "Unparseable generation output");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
    }

    const DOCUMENT: &str = r##"{"content":"# Intro","summary":"s","keyPoints":["k"],"topics":["t"],"metadata":{"wordCount":2,"estimatedReadingTime":1}}"##;

    #[tokio::test]
    async fn test_generate_parses_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(DOCUMENT)))
            .expect(1)
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new("sk-test").with_base_url(server.uri());
        let doc = generator
            .generate("hello", Some("Intro"), &StyleConfig::default())
            .await
            .unwrap();

        assert_eq!(doc.content, "# Intro");
        assert_eq!(doc.topics, vec!["t"]);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][1]["content"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_retryable_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "Rate limit reached", "code": "rate_limit_exceeded" }
            })))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new("sk-test").with_base_url(server.uri());
        let err = generator
            .generate("hello", None, &StyleConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_content_policy_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "flagged", "code": "content_policy_violation" }
            })))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new("sk-test").with_base_url(server.uri());
        let err = generator
            .generate("hello", None, &StyleConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizationError::ContentPolicy(_)));
        assert!(!err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_non_json_content_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Sure! Here is your document.")))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new("sk-test").with_base_url(server.uri());
        let err = generator
            .generate("hello", None, &StyleConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizationError::Parse(_)));
    }
}
