use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::utils::{estimate_reading_minutes, with_retry, RetryPolicy};

pub mod openai;
pub mod style;

pub use openai::OpenAiGenerator;
pub use style::{DocumentFormat, OutputType, SkillLevel, StyleConfig, Tone};

/// A generated document and its derived metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub content: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub sentiment: Option<String>,
    pub topics: Vec<String>,
    pub word_count: u64,
    pub estimated_reading_minutes: u32,
}

/// Summarization errors
#[derive(Debug, Error)]
pub enum SummarizationError {
    #[error("Generation provider rate limit hit")]
    RateLimited,

    #[error("Generation refused by content policy: {0}")]
    ContentPolicy(String),

    #[error("Failed to parse generated document: {0}")]
    Parse(String),

    #[error("Generation failed: {0}")]
    Failed(String),
}

impl SummarizationError {
    /// Only rate limits are worth another attempt
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SummarizationError::RateLimited)
    }
}

/// Port for the text-generation provider
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate(
        &self,
        transcript: &str,
        title: Option<&str>,
        style: &StyleConfig,
    ) -> Result<GeneratedDocument, SummarizationError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedPayload {
    content: String,
    summary: String,
    key_points: Vec<String>,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    topics: Option<Vec<String>>,
    metadata: PayloadMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadMetadata {
    word_count: u64,
    estimated_reading_time: u32,
}

/// Parse the provider's JSON reply. Missing or mistyped fields are an error;
/// nothing is filled in with guesses.
pub fn parse_generated(raw: &str) -> Result<GeneratedDocument, SummarizationError> {
    let payload: GeneratedPayload = serde_json::from_str(raw.trim())
        .map_err(|e| SummarizationError::Parse(e.to_string()))?;

    if payload.content.trim().is_empty() {
        return Err(SummarizationError::Parse("content is empty".to_string()));
    }

    let estimated_reading_minutes = if payload.metadata.estimated_reading_time == 0 {
        estimate_reading_minutes(payload.metadata.word_count)
    } else {
        payload.metadata.estimated_reading_time
    };

    Ok(GeneratedDocument {
        content: payload.content,
        summary: payload.summary,
        key_points: payload.key_points,
        sentiment: payload.sentiment,
        topics: payload.topics.unwrap_or_default(),
        word_count: payload.metadata.word_count,
        estimated_reading_minutes,
    })
}

/// Summarization client: a generator plus a retry budget for rate limits
#[derive(Clone)]
pub struct Summarizer {
    generator: Arc<dyn DocumentGenerator>,
    retry: RetryPolicy,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn DocumentGenerator>, retry: RetryPolicy) -> Self {
        Self { generator, retry }
    }

    pub async fn generate(
        &self,
        transcript: &str,
        title: Option<&str>,
        style: &StyleConfig,
    ) -> Result<GeneratedDocument, SummarizationError> {
        tracing::info!(%style, transcript_chars = transcript.len(), "Generating document");
        with_retry(&self.retry, SummarizationError::is_rate_limited, || {
            self.generator.generate(transcript, title, style)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const VALID: &str = r#"{
        "content": "Step 1: install rustup.",
        "summary": "How to install Rust",
        "keyPoints": ["rustup manages toolchains"],
        "sentiment": "positive",
        "topics": ["rust", "tooling"],
        "metadata": { "wordCount": 4, "estimatedReadingTime": 1 }
    }"#;

    #[test]
    fn test_parse_valid_payload() {
        let doc = parse_generated(VALID).unwrap();
        assert_eq!(doc.content, "Step 1: install rustup.");
        assert_eq!(doc.key_points, vec!["rustup manages toolchains"]);
        assert_eq!(doc.sentiment.as_deref(), Some("positive"));
        assert_eq!(doc.topics.len(), 2);
        assert_eq!(doc.word_count, 4);
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let doc = parse_generated(
            r#"{"content":"c","summary":"s","keyPoints":[],"metadata":{"wordCount":450,"estimatedReadingTime":0}}"#,
        )
        .unwrap();
        assert!(doc.sentiment.is_none());
        assert!(doc.topics.is_empty());
        assert_eq!(doc.estimated_reading_minutes, 3);
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        let cases = [
            "not json",
            r#"{"summary":"s","keyPoints":[],"metadata":{"wordCount":1,"estimatedReadingTime":1}}"#,
            r#"{"content":"c","summary":"s","keyPoints":"one","metadata":{"wordCount":1,"estimatedReadingTime":1}}"#,
            r#"{"content":"c","summary":"s","keyPoints":[]}"#,
            r#"{"content":"  ","summary":"s","keyPoints":[],"metadata":{"wordCount":1,"estimatedReadingTime":1}}"#,
        ];
        for case in cases {
            assert!(
                matches!(parse_generated(case), Err(SummarizationError::Parse(_))),
                "accepted {}",
                case
            );
        }
    }

    struct FlakyGenerator {
        calls: AtomicU32,
        failures: u32,
        error: fn() -> SummarizationError,
    }

    #[async_trait]
    impl DocumentGenerator for FlakyGenerator {
        async fn generate(
            &self,
            _transcript: &str,
            _title: Option<&str>,
            _style: &StyleConfig,
        ) -> Result<GeneratedDocument, SummarizationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err((self.error)());
            }
            parse_generated(VALID)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_are_retried() {
        let generator = Arc::new(FlakyGenerator {
            calls: AtomicU32::new(0),
            failures: 2,
            error: || SummarizationError::RateLimited,
        });
        let summarizer = Summarizer::new(generator.clone(), RetryPolicy::new(3, Duration::from_secs(1)));

        let doc = summarizer
            .generate("transcript", None, &StyleConfig::default())
            .await
            .unwrap();
        assert_eq!(doc.summary, "How to install Rust");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_errors_are_not_retried() {
        let generator = Arc::new(FlakyGenerator {
            calls: AtomicU32::new(0),
            failures: 5,
            error: || SummarizationError::Parse("bad".into()),
        });
        let summarizer = Summarizer::new(generator.clone(), RetryPolicy::new(3, Duration::from_secs(1)));

        let err = summarizer
            .generate("transcript", None, &StyleConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizationError::Parse(_)));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }
}
