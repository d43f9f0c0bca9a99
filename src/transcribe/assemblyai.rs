//! AssemblyAI speech-recognition adapter

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{TranscriptPoll, TranscriptResult, Transcriber, TranscriptionError, TranscriptionOptions};
use crate::extractors::AudioHandle;
use crate::store::{Chapter, Entity, Highlight};
use crate::utils::http_client;

/// AssemblyAI API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.assemblyai.com";

/// Uploads carry whole audio files
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// Request types

#[derive(Debug, Serialize)]
struct TranscriptRequest<'a> {
    audio_url: &'a str,
    auto_chapters: bool,
    auto_highlights: bool,
    entity_detection: bool,
}

// Response types

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    status: String,
    text: Option<String>,
    confidence: Option<f64>,
    audio_duration: Option<f64>,
    chapters: Option<Vec<ApiChapter>>,
    auto_highlights_result: Option<HighlightsResult>,
    entities: Option<Vec<ApiEntity>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChapter {
    headline: String,
    summary: Option<String>,
    start: u64,
    end: u64,
}

#[derive(Debug, Deserialize)]
struct HighlightsResult {
    results: Vec<ApiHighlight>,
}

#[derive(Debug, Deserialize)]
struct ApiHighlight {
    text: String,
    count: u32,
    rank: f64,
}

#[derive(Debug, Deserialize)]
struct ApiEntity {
    entity_type: String,
    text: String,
}

impl TranscriptResponse {
    fn into_poll(self) -> Result<TranscriptPoll, TranscriptionError> {
        match self.status.as_str() {
            "queued" => Ok(TranscriptPoll::Queued),
            "processing" => Ok(TranscriptPoll::Processing),
            "error" => Ok(TranscriptPoll::Failed(
                self.error.unwrap_or_else(|| "unknown provider error".to_string()),
            )),
            "completed" => Ok(TranscriptPoll::Completed(TranscriptResult {
                text: self.text.unwrap_or_default(),
                confidence: self.confidence,
                audio_duration_seconds: self.audio_duration,
                chapters: self
                    .chapters
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| Chapter {
                        title: c.headline,
                        summary: c.summary,
                        start_ms: c.start,
                        end_ms: c.end,
                    })
                    .collect(),
                highlights: self
                    .auto_highlights_result
                    .map(|h| h.results)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|h| Highlight {
                        text: h.text,
                        count: h.count,
                        rank: h.rank,
                    })
                    .collect(),
                entities: self
                    .entities
                    .unwrap_or_default()
                    .into_iter()
                    .map(|e| Entity {
                        entity_type: e.entity_type,
                        text: e.text,
                    })
                    .collect(),
            })),
            other => Err(TranscriptionError::Parse(format!(
                "unknown transcript status '{}'",
                other
            ))),
        }
    }
}

/// AssemblyAI transcriber: uploads audio, then creates and polls a transcript
pub struct AssemblyAiTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AssemblyAiTranscriber {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(REQUEST_TIMEOUT),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn upload(&self, audio: &AudioHandle) -> Result<String, TranscriptionError> {
        let bytes = tokio::fs::read(audio.path()).await?;
        tracing::debug!(
            bytes = bytes.len(),
            format = audio.format().as_str(),
            "Uploading audio"
        );

        let response = self
            .client
            .post(format!("{}/v2/upload", self.base_url))
            .header("authorization", &self.api_key)
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        let response = check_status(response).await?;
        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Parse(e.to_string()))?;
        Ok(upload.upload_url)
    }
}

/// Map a non-success HTTP status onto the error taxonomy
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TranscriptionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(%status, body = %body, "AssemblyAI request failed");

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TranscriptionError::Auth {
            status: status.as_u16(),
        },
        StatusCode::TOO_MANY_REQUESTS => TranscriptionError::RateLimited,
        s if s.is_server_error() => TranscriptionError::Server { status: s.as_u16() },
        s => TranscriptionError::Rejected {
            status: s.as_u16(),
            message: body,
        },
    })
}

#[async_trait]
impl Transcriber for AssemblyAiTranscriber {
    async fn submit(
        &self,
        audio: &AudioHandle,
        options: &TranscriptionOptions,
    ) -> Result<String, TranscriptionError> {
        let audio_url = self.upload(audio).await?;

        let request = TranscriptRequest {
            audio_url: &audio_url,
            auto_chapters: options.auto_chapters,
            auto_highlights: options.auto_highlights,
            entity_detection: options.entity_detection,
        };

        let response = self
            .client
            .post(format!("{}/v2/transcript", self.base_url))
            .header("authorization", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        let response = check_status(response).await?;
        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Parse(e.to_string()))?;
        Ok(submitted.id)
    }

    async fn poll(&self, job_id: &str) -> Result<TranscriptPoll, TranscriptionError> {
        let response = self
            .client
            .get(format!("{}/v2/transcript/{}", self.base_url, job_id))
            .header("authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        let response = check_status(response).await?;
        let transcript: TranscriptResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Parse(e.to_string()))?;
        transcript.into_poll()
    }
}
