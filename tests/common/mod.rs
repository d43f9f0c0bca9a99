//! Shared fakes for pipeline integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vidscribe::extractors::{extract_video_id, AudioFormat, AudioHandle, MediaError, MediaResolver, VideoInfo};
use vidscribe::pipeline::{DocumentLifecycleManager, PipelineSettings};
use vidscribe::quota::{StaticBilling, Tier};
use vidscribe::store::{DocumentStore, SqliteStore, UsagePeriod};
use vidscribe::summarize::{
    parse_generated, DocumentGenerator, GeneratedDocument, StyleConfig, SummarizationError, Summarizer,
};
use vidscribe::transcribe::{
    PollSettings, TranscriptPoll, TranscriptResult, Transcriber, TranscriptionError, TranscriptionOptions,
    TranscriptionProcessor,
};
use vidscribe::utils::RetryPolicy;

pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Where the fake media source breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaFailure {
    #[default]
    None,
    /// Metadata lookup answers like a 403 from the platform
    Forbidden,
    /// Download starts writing audio, then yt-dlp exits non-zero
    Download,
}

/// Resolves any recognized URL to a video of fixed duration and writes a
/// small audio file for it
pub struct FakeMedia {
    pub duration_seconds: u64,
    pub failure: MediaFailure,
    pub info_calls: AtomicU32,
    pub download_calls: AtomicU32,
    pub downloaded: Mutex<Vec<PathBuf>>,
}

impl FakeMedia {
    pub fn new(duration_seconds: u64, failure: MediaFailure) -> Self {
        Self {
            duration_seconds,
            failure,
            info_calls: AtomicU32::new(0),
            download_calls: AtomicU32::new(0),
            downloaded: Mutex::new(Vec::new()),
        }
    }

    pub fn downloaded_paths(&self) -> Vec<PathBuf> {
        self.downloaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaResolver for FakeMedia {
    fn video_id(&self, url: &str) -> Result<String, MediaError> {
        extract_video_id(url).ok_or_else(|| MediaError::InvalidVideoReference(url.to_string()))
    }

    async fn video_info(&self, url: &str) -> Result<VideoInfo, MediaError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if self.failure == MediaFailure::Forbidden {
            return Err(MediaError::QuotaOrAuthExhausted("HTTP 403 quotaExceeded".to_string()));
        }
        Ok(VideoInfo {
            id: self.video_id(url)?,
            title: "Rust in 100 Seconds".to_string(),
            duration_seconds: self.duration_seconds,
            channel_title: "Fireship".to_string(),
            source_url: url.to_string(),
        })
    }

    async fn download_audio(&self, _info: &VideoInfo, dir: &Path) -> Result<AudioHandle, MediaError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let handle = AudioHandle::create_in(dir, AudioFormat::Mp3)?;
        std::fs::write(handle.path(), b"ID3 fake audio")?;
        self.downloaded.lock().unwrap().push(handle.path().to_path_buf());
        if self.failure == MediaFailure::Download {
            return Err(MediaError::DownloadFailed("yt-dlp exited with status 1".to_string()));
        }
        Ok(handle)
    }
}

/// Replays scripted poll results, then repeats the fallback forever
pub struct FakeTranscriber {
    script: Mutex<VecDeque<TranscriptPoll>>,
    fallback: TranscriptPoll,
    pub submit_calls: AtomicU32,
    pub poll_calls: AtomicU32,
}

impl FakeTranscriber {
    pub fn new(script: Vec<TranscriptPoll>, fallback: TranscriptPoll) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            submit_calls: AtomicU32::new(0),
            poll_calls: AtomicU32::new(0),
        }
    }

    /// Completes on the second poll
    pub fn succeeding() -> Self {
        Self::new(
            vec![TranscriptPoll::Processing, TranscriptPoll::Completed(transcript())],
            TranscriptPoll::Processing,
        )
    }

    pub fn failing(reason: &str) -> Self {
        Self::new(vec![TranscriptPoll::Failed(reason.to_string())], TranscriptPoll::Processing)
    }

    pub fn stuck() -> Self {
        Self::new(vec![], TranscriptPoll::Processing)
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn submit(
        &self,
        audio: &AudioHandle,
        _options: &TranscriptionOptions,
    ) -> Result<String, TranscriptionError> {
        assert!(audio.path().exists(), "audio must exist while transcribing");
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("tx-{}", n))
    }

    async fn poll(&self, _job_id: &str) -> Result<TranscriptPoll, TranscriptionError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

pub fn transcript() -> TranscriptResult {
    TranscriptResult {
        text: "Rust is a language empowering everyone to build reliable software".to_string(),
        confidence: Some(0.94),
        audio_duration_seconds: Some(139.0),
        ..Default::default()
    }
}

pub const GENERATED_JSON: &str = r##"{
    "content": "# Rust in 100 Seconds\n\nRust is fast and memory safe.",
    "summary": "A rapid overview of Rust",
    "keyPoints": ["Ownership", "No garbage collector"],
    "sentiment": "positive",
    "topics": ["rust"],
    "metadata": { "wordCount": 9, "estimatedReadingTime": 1 }
}"##;

/// Fails with the scripted errors in order, then succeeds
pub struct FakeGenerator {
    failures: Mutex<VecDeque<SummarizationError>>,
    pub calls: AtomicU32,
}

impl FakeGenerator {
    pub fn new(failures: Vec<SummarizationError>) -> Self {
        Self {
            failures: Mutex::new(failures.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(vec![])
    }
}

#[async_trait]
impl DocumentGenerator for FakeGenerator {
    async fn generate(
        &self,
        _transcript: &str,
        _title: Option<&str>,
        _style: &StyleConfig,
    ) -> Result<GeneratedDocument, SummarizationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        parse_generated(GENERATED_JSON)
    }
}

/// A manager wired to fakes and an in-memory store
pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub media: Arc<FakeMedia>,
    pub transcriber: Arc<FakeTranscriber>,
    pub generator: Arc<FakeGenerator>,
    pub manager: DocumentLifecycleManager,
    pub temp_dir: tempfile::TempDir,
}

pub struct HarnessBuilder {
    duration_seconds: u64,
    media_failure: MediaFailure,
    transcriber: FakeTranscriber,
    generator: FakeGenerator,
    tiers: HashMap<String, Tier>,
    max_polls: u32,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            duration_seconds: 120,
            media_failure: MediaFailure::None,
            transcriber: FakeTranscriber::succeeding(),
            generator: FakeGenerator::succeeding(),
            tiers: HashMap::new(),
            max_polls: 60,
        }
    }
}

impl HarnessBuilder {
    pub fn duration(mut self, seconds: u64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn media_failure(mut self, failure: MediaFailure) -> Self {
        self.media_failure = failure;
        self
    }

    pub fn transcriber(mut self, transcriber: FakeTranscriber) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn generator(mut self, generator: FakeGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn tier(mut self, account: &str, tier: Tier) -> Self {
        self.tiers.insert(account.to_string(), tier);
        self
    }

    pub fn max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let media = Arc::new(FakeMedia::new(self.duration_seconds, self.media_failure));
        let transcriber = Arc::new(self.transcriber);
        let generator = Arc::new(self.generator);
        let temp_dir = tempfile::tempdir().unwrap();

        let retry = RetryPolicy::new(3, Duration::from_millis(2));
        let poll = PollSettings::new(Duration::from_millis(1), self.max_polls)
            .with_deadline(Duration::from_secs(10));

        let manager = DocumentLifecycleManager::new(
            store.clone(),
            media.clone(),
            TranscriptionProcessor::new(transcriber.clone(), poll, retry),
            Summarizer::new(generator.clone(), retry),
            Arc::new(StaticBilling::with_accounts(Tier::Free, self.tiers)),
            PipelineSettings {
                temp_dir: temp_dir.path().to_path_buf(),
                metadata_retry: retry,
                ..Default::default()
            },
        );

        Harness {
            store,
            media,
            transcriber,
            generator,
            manager,
            temp_dir,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Record `documents` completions totalling `seconds` for this month
    pub async fn seed_usage(&self, account: &str, documents: u64, seconds: u64) {
        let period = UsagePeriod::current();
        for i in 0..documents {
            let share = if i == 0 { seconds } else { 0 };
            self.store.increment_usage(account, &period, share).await.unwrap();
        }
    }

    pub fn provider_calls(&self) -> u32 {
        self.media.download_calls.load(Ordering::SeqCst)
            + self.transcriber.submit_calls.load(Ordering::SeqCst)
            + self.transcriber.poll_calls.load(Ordering::SeqCst)
            + self.generator.calls.load(Ordering::SeqCst)
    }

    /// Files left in the download directory
    pub fn leftover_audio(&self) -> usize {
        std::fs::read_dir(self.temp_dir.path()).unwrap().count()
    }
}
