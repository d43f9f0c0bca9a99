use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extractors::AudioHandle;
use crate::store::{Chapter, Entity, Highlight, JobStatus};

pub mod assemblyai;
pub mod processor;

pub use assemblyai::AssemblyAiTranscriber;
pub use processor::{NoopObserver, PollObserver, PollSettings, PollUpdate, TranscriptionProcessor};

/// Features requested from the speech-recognition provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionOptions {
    pub auto_chapters: bool,
    pub auto_highlights: bool,
    pub entity_detection: bool,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            auto_chapters: true,
            auto_highlights: true,
            entity_detection: true,
        }
    }
}

/// Transcript text plus its time-aligned metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub text: String,

    /// Overall confidence score (0.0 to 1.0)
    pub confidence: Option<f64>,

    /// Audio duration in seconds as measured by the provider
    pub audio_duration_seconds: Option<f64>,

    pub chapters: Vec<Chapter>,
    pub highlights: Vec<Highlight>,
    pub entities: Vec<Entity>,
}

/// State of a provider job as seen by one poll
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptPoll {
    Queued,
    Processing,
    Completed(TranscriptResult),
    /// Provider-side failure with the provider's own message
    Failed(String),
}

impl TranscriptPoll {
    pub fn status(&self) -> JobStatus {
        match self {
            TranscriptPoll::Queued => JobStatus::Queued,
            TranscriptPoll::Processing => JobStatus::Processing,
            TranscriptPoll::Completed(_) => JobStatus::Completed,
            TranscriptPoll::Failed(_) => JobStatus::Error,
        }
    }
}

/// Transcription errors
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Transcription request failed: {0}")]
    Request(String),

    #[error("Transcription provider rate limit hit")]
    RateLimited,

    #[error("Transcription provider returned HTTP {status}")]
    Server { status: u16 },

    #[error("Transcription provider rejected credentials (HTTP {status})")]
    Auth { status: u16 },

    #[error("Transcription request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Transcription failed: {0}")]
    Failed(String),

    #[error("Transcription did not finish after {polls} polls")]
    Timeout { polls: u32 },

    #[error("Failed to parse transcription response: {0}")]
    Parse(String),

    #[error("Failed to read audio: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscriptionError {
    /// Network failures, rate limits and provider 5xx responses
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TranscriptionError::Request(_)
                | TranscriptionError::RateLimited
                | TranscriptionError::Server { .. }
        )
    }
}

/// Port for the speech-recognition provider
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Hand the audio to the provider and return its job id
    async fn submit(
        &self,
        audio: &AudioHandle,
        options: &TranscriptionOptions,
    ) -> Result<String, TranscriptionError>;

    /// Fetch the current state of a job
    async fn poll(&self, job_id: &str) -> Result<TranscriptPoll, TranscriptionError>;
}
