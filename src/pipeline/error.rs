use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::extractors::MediaError;
use crate::quota::{QuotaDenial, QuotaError};
use crate::store::{DocumentStatus, StoreError};
use crate::summarize::SummarizationError;
use crate::transcribe::TranscriptionError;

/// Stable classification of a pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidVideoReference,
    QuotaExceeded,
    QuotaCheckFailed,
    MediaAcquisitionFailed,
    TranscriptionFailed,
    TranscriptionTimeout,
    SummarizationRateLimited,
    SummarizationParseError,
    SummarizationFailed,
    StoreUnavailable,
    DocumentNotPending,
    DocumentNotFound,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidVideoReference => "invalid_video_reference",
            Self::QuotaExceeded => "quota_exceeded",
            Self::QuotaCheckFailed => "quota_check_failed",
            Self::MediaAcquisitionFailed => "media_acquisition_failed",
            Self::TranscriptionFailed => "transcription_failed",
            Self::TranscriptionTimeout => "transcription_timeout",
            Self::SummarizationRateLimited => "summarization_rate_limited",
            Self::SummarizationParseError => "summarization_parse_error",
            Self::SummarizationFailed => "summarization_failed",
            Self::StoreUnavailable => "store_unavailable",
            Self::DocumentNotPending => "document_not_pending",
            Self::DocumentNotFound => "document_not_found",
        }
    }

    /// Message safe to persist on the document row and show to users
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidVideoReference => "The link is not a supported video URL.",
            Self::QuotaExceeded => "Your monthly usage limit has been reached.",
            Self::QuotaCheckFailed => "Usage limits could not be verified. Please try again later.",
            Self::MediaAcquisitionFailed => {
                "The video could not be retrieved. It may be private, removed or temporarily unavailable."
            }
            Self::TranscriptionFailed => "The audio could not be transcribed.",
            Self::TranscriptionTimeout => "Transcription took too long and was stopped.",
            Self::SummarizationRateLimited => {
                "The document generator is busy. Please create a new document later."
            }
            Self::SummarizationParseError => "The generated document was malformed.",
            Self::SummarizationFailed => "The document could not be generated.",
            Self::StoreUnavailable => "A storage error interrupted processing.",
            Self::DocumentNotPending => "This document has already been processed.",
            Self::DocumentNotFound => "Document not found.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline failure. The wrapped component error stays reachable through
/// `source()` for logs; only [`ProcessingError::user_message`] is persisted.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(QuotaDenial),

    #[error("Quota check failed: {0}")]
    QuotaCheckFailed(#[from] QuotaError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    Summarization(#[from] SummarizationError),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Document {id} is already {status}")]
    DocumentNotPending { id: String, status: DocumentStatus },

    #[error("Document not found: {0}")]
    DocumentNotFound(String),
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Self::QuotaCheckFailed(_) => ErrorKind::QuotaCheckFailed,
            Self::Media(MediaError::InvalidVideoReference(_)) => ErrorKind::InvalidVideoReference,
            Self::Media(_) => ErrorKind::MediaAcquisitionFailed,
            Self::Transcription(TranscriptionError::Timeout { .. }) => ErrorKind::TranscriptionTimeout,
            Self::Transcription(_) => ErrorKind::TranscriptionFailed,
            Self::Summarization(SummarizationError::RateLimited) => ErrorKind::SummarizationRateLimited,
            Self::Summarization(SummarizationError::Parse(_)) => ErrorKind::SummarizationParseError,
            Self::Summarization(_) => ErrorKind::SummarizationFailed,
            Self::Store(_) => ErrorKind::StoreUnavailable,
            Self::DocumentNotPending { .. } => ErrorKind::DocumentNotPending,
            Self::DocumentNotFound(_) => ErrorKind::DocumentNotFound,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }

    /// Failures that happen before the pipeline owns the document. The
    /// document is left exactly as it was.
    pub fn leaves_document_untouched(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::QuotaExceeded
                | ErrorKind::QuotaCheckFailed
                | ErrorKind::DocumentNotPending
                | ErrorKind::DocumentNotFound
        )
    }
}

/// Map a refused `pending -> processing` transition onto the taxonomy
pub(crate) fn from_start_refusal(error: StoreError) -> ProcessingError {
    match error {
        StoreError::Conflict { id, current, .. } => ProcessingError::DocumentNotPending {
            id,
            status: current,
        },
        StoreError::NotFound(id) => ProcessingError::DocumentNotFound(id),
        other => ProcessingError::Store(other),
    }
}
