//! Document lifecycle: `pending -> processing -> completed | error`.
//!
//! The manager drives media acquisition, transcription and generation in
//! order and persists after every stage. Usage is recorded once, after the
//! document reaches `completed`.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::extractors::{AudioHandle, MediaError, MediaResolver, VideoInfo};
use crate::quota::{BillingProvider, QuotaDecision, QuotaEvaluator, UsageRecorder};
use crate::store::{
    Document, DocumentMetadata, DocumentStatus, DocumentStore, JobStatus, JobUpdate, ProcessingJob, VideoMetadata,
};
use crate::summarize::{GeneratedDocument, StyleConfig, Summarizer};
use crate::transcribe::{PollObserver, TranscriptResult, TranscriptionOptions, TranscriptionProcessor};
use crate::utils::{count_words, with_retry, RetryPolicy};

pub mod error;
pub mod progress;

pub use error::{ErrorKind, ProcessingError};
pub use progress::JobProgressObserver;

/// Request to run the pipeline for an existing pending document
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessTrigger {
    pub document_id: String,
    pub video_url: String,
    pub style: StyleConfig,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Where audio is downloaded; files never outlive a run
    pub temp_dir: PathBuf,
    pub transcription: TranscriptionOptions,
    /// Retry budget for video metadata lookups
    pub metadata_retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            transcription: TranscriptionOptions::default(),
            metadata_retry: RetryPolicy::default(),
        }
    }
}

/// Orchestrates one document at a time per call; clone it to run many
#[derive(Clone)]
pub struct DocumentLifecycleManager {
    store: Arc<dyn DocumentStore>,
    media: Arc<dyn MediaResolver>,
    transcription: TranscriptionProcessor,
    summarizer: Summarizer,
    quota: QuotaEvaluator,
    usage: UsageRecorder,
    settings: Arc<PipelineSettings>,
    progress: Option<Arc<dyn PollObserver>>,
}

impl DocumentLifecycleManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        media: Arc<dyn MediaResolver>,
        transcription: TranscriptionProcessor,
        summarizer: Summarizer,
        billing: Arc<dyn BillingProvider>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            quota: QuotaEvaluator::new(store.clone(), billing),
            usage: UsageRecorder::new(store.clone()),
            store,
            media,
            transcription,
            summarizer,
            settings: Arc::new(settings),
            progress: None,
        }
    }

    /// Receive every transcription poll in addition to the job row updates
    pub fn with_progress_observer(mut self, observer: Arc<dyn PollObserver>) -> Self {
        self.progress = Some(observer);
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn quota(&self) -> &QuotaEvaluator {
        &self.quota
    }

    pub fn usage(&self) -> &UsageRecorder {
        &self.usage
    }

    /// Insert a new pending document for `video_url`
    pub async fn create(&self, user_id: &str, video_url: &str) -> Result<Document, ProcessingError> {
        let document = Document::pending(user_id, video_url);
        self.store.insert_document(&document).await?;
        tracing::info!(document_id = %document.id, user_id, "Document created");
        Ok(document)
    }

    /// Create a document, gate it on quota, then run the pipeline.
    ///
    /// An unrecognized URL moves the document to `error` before any network
    /// access. A quota denial or an unreadable quota leaves it `pending` and
    /// nothing is downloaded, transcribed or generated.
    pub async fn submit(
        &self,
        user_id: &str,
        video_url: &str,
        style: StyleConfig,
    ) -> Result<Document, ProcessingError> {
        let document = self.create(user_id, video_url).await?;
        let span = tracing::info_span!("submit", document_id = %document.id);

        async {
            let info = match self.fetch_video_info(video_url).await {
                Ok(info) => info,
                Err(e) => return Err(self.fail_pending(&document.id, e.into()).await),
            };

            match self.quota.can_process(user_id, info.duration_seconds).await? {
                QuotaDecision::Allowed => {}
                QuotaDecision::Denied(denial) => {
                    tracing::info!(user_id, reason = %denial, "Quota denied; document left pending");
                    return Err(ProcessingError::QuotaExceeded(denial));
                }
            }

            self.run(&document.id, video_url, Some(info), &style).await
        }
        .instrument(span)
        .await
    }

    /// Run the pipeline for a document that already exists in `pending`
    pub async fn process(&self, trigger: ProcessTrigger) -> Result<Document, ProcessingError> {
        let span = tracing::info_span!("process", document_id = %trigger.document_id);

        async {
            let document = self
                .store
                .get_document(&trigger.document_id)
                .await?
                .ok_or_else(|| ProcessingError::DocumentNotFound(trigger.document_id.clone()))?;

            if document.status != DocumentStatus::Pending {
                return Err(ProcessingError::DocumentNotPending {
                    id: document.id,
                    status: document.status,
                });
            }

            self.run(&document.id, &trigger.video_url, None, &trigger.style)
                .await
        }
        .instrument(span)
        .await
    }

    /// Run [`Self::process`] as an independent task
    pub fn spawn(&self, trigger: ProcessTrigger) -> JoinHandle<Result<Document, ProcessingError>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.process(trigger).await })
    }

    async fn fetch_video_info(&self, video_url: &str) -> Result<VideoInfo, MediaError> {
        // Validate locally first so a bad URL never reaches the network
        self.media.video_id(video_url)?;
        with_retry(&self.settings.metadata_retry, MediaError::is_transient, || {
            self.media.video_info(video_url)
        })
        .await
    }

    /// Move a still-pending document straight to `error`
    async fn fail_pending(&self, document_id: &str, error: ProcessingError) -> ProcessingError {
        tracing::error!(kind = %error.kind(), "Submission failed: {}", error);
        if let Err(e) = self.store.mark_error(document_id, error.user_message()).await {
            tracing::error!("Failed to record document error: {}", e);
        }
        error
    }

    async fn run(
        &self,
        document_id: &str,
        video_url: &str,
        prefetched: Option<VideoInfo>,
        style: &StyleConfig,
    ) -> Result<Document, ProcessingError> {
        self.store
            .mark_processing(document_id)
            .await
            .map_err(error::from_start_refusal)?;
        tracing::info!("Document processing started");

        match self.run_stages(document_id, video_url, prefetched, style).await {
            Ok(document) => Ok(document),
            Err(error) => {
                tracing::error!(kind = %error.kind(), "Pipeline failed: {}", error);
                if !error.leaves_document_untouched() {
                    if let Err(e) = self.store.mark_error(document_id, error.user_message()).await {
                        tracing::error!("Failed to record document error: {}", e);
                    }
                }
                Err(error)
            }
        }
    }

    async fn run_stages(
        &self,
        document_id: &str,
        video_url: &str,
        prefetched: Option<VideoInfo>,
        style: &StyleConfig,
    ) -> Result<Document, ProcessingError> {
        let info = match prefetched {
            Some(info) => info,
            None => self.fetch_video_info(video_url).await?,
        };

        let mut metadata = VideoMetadata {
            video_id: Some(info.id.clone()),
            title: Some(info.title.clone()),
            channel_title: Some(info.channel_title.clone()),
            duration_seconds: Some(info.duration_seconds),
            ..Default::default()
        };
        self.save(document_id, &metadata).await?;
        tracing::info!(video_id = %info.id, duration_seconds = info.duration_seconds, "Video metadata stored");

        let audio = self
            .media
            .download_audio(&info, &self.settings.temp_dir)
            .await?;

        let outcome = self
            .transcribe_and_generate(document_id, &info, &audio, &mut metadata, style)
            .await;

        if let Err(e) = audio.release() {
            tracing::warn!("Failed to delete audio file: {}", e);
        }

        let generated = outcome?;

        let final_metadata = DocumentMetadata::Video(metadata);
        self.store
            .mark_completed(document_id, &generated.content, &final_metadata)
            .await?;
        tracing::info!(word_count = generated.word_count, "Document completed");

        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| ProcessingError::DocumentNotFound(document_id.to_string()))?;

        self.usage
            .record_completion(&document.user_id, info.duration_seconds)
            .await?;

        Ok(document)
    }

    async fn transcribe_and_generate(
        &self,
        document_id: &str,
        info: &VideoInfo,
        audio: &AudioHandle,
        metadata: &mut VideoMetadata,
        style: &StyleConfig,
    ) -> Result<GeneratedDocument, ProcessingError> {
        let transcript = self.transcribe(document_id, audio).await?;

        metadata.word_count = Some(count_words(&transcript.text));
        metadata.transcript = Some(transcript.text.clone());
        metadata.confidence = transcript.confidence;
        metadata.chapters = transcript.chapters;
        metadata.highlights = transcript.highlights;
        metadata.entities = transcript.entities;
        self.save(document_id, metadata).await?;
        tracing::info!(words = metadata.word_count, "Transcript stored");

        let generated = self
            .summarizer
            .generate(&transcript.text, Some(&info.title), style)
            .await?;

        metadata.summary = Some(generated.summary.clone());
        metadata.key_points = generated.key_points.clone();
        metadata.sentiment = generated.sentiment.clone();
        metadata.topics = generated.topics.clone();
        metadata.estimated_reading_minutes = Some(generated.estimated_reading_minutes);

        Ok(generated)
    }

    async fn transcribe(
        &self,
        document_id: &str,
        audio: &AudioHandle,
    ) -> Result<TranscriptResult, ProcessingError> {
        let provider_job_id = self
            .transcription
            .submit(audio, &self.settings.transcription)
            .await?;

        let job = ProcessingJob::queued(document_id, &provider_job_id);
        self.store.insert_job(&job).await?;

        let observer = JobProgressObserver::new(self.store.clone(), &job.id)
            .forwarding_to(self.progress.clone());

        match self
            .transcription
            .wait_for_completion(&provider_job_id, &observer)
            .await
        {
            Ok(transcript) => Ok(transcript),
            Err(e) => {
                let error = ProcessingError::from(e);
                let update = JobUpdate {
                    status: JobStatus::Error,
                    progress: 0,
                    status_message: None,
                    error_message: Some(error.user_message().to_string()),
                };
                if let Err(store_error) = self.store.update_job(&job.id, &update).await {
                    tracing::warn!(job_id = %job.id, "Failed to record job failure: {}", store_error);
                }
                Err(error)
            }
        }
    }

    async fn save(&self, document_id: &str, metadata: &VideoMetadata) -> Result<(), ProcessingError> {
        self.store
            .save_metadata(document_id, &DocumentMetadata::Video(metadata.clone()))
            .await?;
        Ok(())
    }
}
