use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a document.
///
/// `Pending` is the only initial state. `Completed` and `Error` are terminal:
/// a document is recreated, never resurrected, to be processed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Error)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "error" => Ok(DocumentStatus::Error),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

/// Auto-detected chapter, times in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Key phrase the provider flagged as important
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub text: String,
    pub count: u32,
    pub rank: f64,
}

/// Named entity detected in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: String,
    pub text: String,
}

/// Metadata for documents produced from a video.
///
/// Filled in stage by stage: video info first, then the transcript and its
/// aligned metadata, then the generated summary fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chapters: Vec<Chapter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<Highlight>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_reading_minutes: Option<u32>,
}

/// Metadata for documents written by hand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Document metadata, tagged by how the document came to exist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DocumentMetadata {
    Video(VideoMetadata),
    Manual(ManualMetadata),
}

impl DocumentMetadata {
    pub fn as_video(&self) -> Option<&VideoMetadata> {
        match self {
            DocumentMetadata::Video(video) => Some(video),
            DocumentMetadata::Manual(_) => None,
        }
    }
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        DocumentMetadata::Video(VideoMetadata::default())
    }
}

/// The persisted unit of work: one video-to-document conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub status: DocumentStatus,
    pub source_reference: String,
    pub content: Option<String>,
    pub metadata: DocumentMetadata,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Document {
    /// New pending document for a video URL
    pub fn pending(user_id: impl Into<String>, source_reference: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            status: DocumentStatus::Pending,
            source_reference: source_reference.into(),
            content: None,
            metadata: DocumentMetadata::default(),
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn video_metadata(&self) -> Option<&VideoMetadata> {
        self.metadata.as_video()
    }

    /// `content` and `error_message` are never both set, and both are empty
    /// until the document reaches a terminal state.
    pub fn upholds_output_invariant(&self) -> bool {
        match self.status {
            DocumentStatus::Pending | DocumentStatus::Processing => {
                self.content.is_none() && self.error_message.is_none()
            }
            DocumentStatus::Completed => self.content.is_some() && self.error_message.is_none(),
            DocumentStatus::Error => self.content.is_none() && self.error_message.is_some(),
        }
    }
}

/// Provider-side job state mirrored onto the processing job row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Tracking row for one transcription job of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: String,
    pub document_id: String,
    pub provider_job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    pub fn queued(document_id: impl Into<String>, provider_job_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            provider_job_id: provider_job_id.into(),
            status: JobStatus::Queued,
            progress: 0,
            status_message: Some("Queued for transcription".to_string()),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields written on every poll of a job
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub progress: u8,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
}

/// Calendar month that usage is counted against, formatted `YYYY-MM`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsagePeriod(String);

impl UsagePeriod {
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self(format!("{:04}-{:02}", at.year(), at.month()))
    }

    pub fn current() -> Self {
        Self::containing(Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UsagePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monthly consumption of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub user_id: String,
    pub period: UsagePeriod,
    pub documents_processed: u64,
    pub total_video_duration_seconds: u64,
}

impl UsageCounter {
    pub fn empty(user_id: impl Into<String>, period: UsagePeriod) -> Self {
        Self {
            user_id: user_id.into(),
            period,
            documents_processed: 0,
            total_video_duration_seconds: 0,
        }
    }
}
