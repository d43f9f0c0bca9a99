use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tempfile::TempPath;
use thiserror::Error;

pub mod youtube;

pub use youtube::{extract_video_id, YoutubeResolver};

/// Intrinsic metadata of a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Canonical platform identifier
    pub id: String,

    pub title: String,

    pub duration_seconds: u64,

    pub channel_title: String,

    /// URL the video was resolved from
    pub source_url: String,
}

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Wav,
    Webm,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Webm => "webm",
        }
    }
}

/// Local audio file that is deleted when the handle goes away.
///
/// Dropping the handle removes the file on every exit path, including early
/// returns and panics; [`AudioHandle::release`] does the same but reports
/// failures.
#[derive(Debug)]
pub struct AudioHandle {
    path: TempPath,
    format: AudioFormat,
}

impl AudioHandle {
    pub fn new(path: TempPath, format: AudioFormat) -> Self {
        Self { path, format }
    }

    /// Create an empty audio file in `dir` to be filled by a downloader
    pub fn create_in(dir: &Path, format: AudioFormat) -> std::io::Result<Self> {
        let path = tempfile::Builder::new()
            .prefix("audio_")
            .suffix(&format!(".{}", format.as_str()))
            .tempfile_in(dir)?
            .into_temp_path();
        Ok(Self::new(path, format))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn release(self) -> std::io::Result<()> {
        let shown = self.path.display().to_string();
        self.path.close()?;
        tracing::debug!(path = %shown, "Released audio file");
        Ok(())
    }
}

/// Media acquisition errors
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Not a recognized video URL: {0}")]
    InvalidVideoReference(String),

    #[error("Video platform quota or credentials exhausted: {0}")]
    QuotaOrAuthExhausted(String),

    #[error("Video not found or not public: {0}")]
    VideoNotFound(String),

    #[error("Metadata request failed: {0}")]
    MetadataRequest(String),

    #[error("Metadata request rejected: {0}")]
    MetadataRejected(String),

    #[error("Failed to parse video metadata: {0}")]
    MetadataParse(String),

    #[error("Audio download failed: {0}")]
    DownloadFailed(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Network hiccups and platform 5xx responses; everything else is final
    pub fn is_transient(&self) -> bool {
        matches!(self, MediaError::MetadataRequest(_))
    }
}

/// Port for turning a video URL into metadata and a local audio file
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Canonical video id, without any network access
    fn video_id(&self, url: &str) -> Result<String, MediaError>;

    async fn video_info(&self, url: &str) -> Result<VideoInfo, MediaError>;

    /// Download the audio track of `info` into `dir`
    async fn download_audio(&self, info: &VideoInfo, dir: &Path)
        -> Result<AudioHandle, MediaError>;
}
