use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use super::{TranscriptPoll, TranscriptResult, Transcriber, TranscriptionError, TranscriptionOptions};
use crate::extractors::AudioHandle;
use crate::store::JobStatus;
use crate::utils::{with_retry, RetryPolicy};

/// Polling cadence for a transcription job.
///
/// `deadline` bounds the whole wait, retries and backoff included. It
/// defaults to `interval * max_polls`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_polls: u32,
    pub deadline: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 60)
    }
}

impl PollSettings {
    pub fn new(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls,
            deadline: interval.saturating_mul(max_polls),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Wall-clock limit for waiting on one job
    pub fn ceiling(&self) -> Duration {
        self.deadline
    }
}

/// Reported after every poll, whether or not the status changed
#[derive(Debug, Clone, PartialEq)]
pub struct PollUpdate {
    pub job_id: String,
    pub poll: u32,
    pub max_polls: u32,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
}

impl PollUpdate {
    fn new(job_id: &str, poll: u32, max_polls: u32, state: &TranscriptPoll) -> Self {
        let status = state.status();
        let progress = progress_for(status, poll, max_polls);
        let message = match state {
            TranscriptPoll::Queued => "Waiting in the transcription queue".to_string(),
            TranscriptPoll::Processing => format!("Transcribing audio (check {}/{})", poll, max_polls),
            TranscriptPoll::Completed(_) => "Transcription complete".to_string(),
            TranscriptPoll::Failed(_) => "Transcription failed".to_string(),
        };

        Self {
            job_id: job_id.to_string(),
            poll,
            max_polls,
            status,
            progress,
            message,
        }
    }
}

/// Maps provider status onto a 0-100 progress value. Processing grows with
/// the poll count and stays below 90 until the provider reports completion.
pub fn progress_for(status: JobStatus, poll: u32, max_polls: u32) -> u8 {
    match status {
        JobStatus::Queued => 10,
        JobStatus::Processing => {
            let span = 80 * u64::from(poll.min(max_polls)) / u64::from(max_polls.max(1));
            (10 + span).min(90) as u8
        }
        JobStatus::Completed | JobStatus::Error => 100,
    }
}

/// Receives every poll of a transcription job
#[async_trait]
pub trait PollObserver: Send + Sync {
    async fn on_poll(&self, update: &PollUpdate);
}

/// Observer that ignores updates
pub struct NoopObserver;

#[async_trait]
impl PollObserver for NoopObserver {
    async fn on_poll(&self, _update: &PollUpdate) {}
}

/// Drives a transcription job from submission to a terminal state.
///
/// Network calls are retried for transient failures only. A provider-side
/// `error` status and the poll ceiling are final.
#[derive(Clone)]
pub struct TranscriptionProcessor {
    transcriber: Arc<dyn Transcriber>,
    settings: PollSettings,
    retry: RetryPolicy,
}

impl TranscriptionProcessor {
    pub fn new(transcriber: Arc<dyn Transcriber>, settings: PollSettings, retry: RetryPolicy) -> Self {
        Self {
            transcriber,
            settings,
            retry,
        }
    }

    pub async fn submit(
        &self,
        audio: &AudioHandle,
        options: &TranscriptionOptions,
    ) -> Result<String, TranscriptionError> {
        let job_id = with_retry(&self.retry, TranscriptionError::is_transient, || {
            self.transcriber.submit(audio, options)
        })
        .await?;

        tracing::info!(job_id = %job_id, "Transcription job submitted");
        Ok(job_id)
    }

    /// Poll `job_id` until it completes, fails, or the poll ceiling is reached.
    ///
    /// Both `max_polls` and the wall-clock deadline apply. Transient errors
    /// retried inside a poll still count against the deadline.
    pub async fn wait_for_completion(
        &self,
        job_id: &str,
        observer: &dyn PollObserver,
    ) -> Result<TranscriptResult, TranscriptionError> {
        let mut polls_done = 0;
        let outcome = timeout(
            self.settings.ceiling(),
            self.poll_until_terminal(job_id, observer, &mut polls_done),
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    job_id,
                    polls = polls_done,
                    deadline_secs = self.settings.ceiling().as_secs(),
                    "Transcription deadline reached"
                );
                Err(TranscriptionError::Timeout { polls: polls_done })
            }
        }
    }

    async fn poll_until_terminal(
        &self,
        job_id: &str,
        observer: &dyn PollObserver,
        polls_done: &mut u32,
    ) -> Result<TranscriptResult, TranscriptionError> {
        let max_polls = self.settings.max_polls;

        for poll in 1..=max_polls {
            let state = with_retry(&self.retry, TranscriptionError::is_transient, || {
                self.transcriber.poll(job_id)
            })
            .await?;
            *polls_done = poll;

            let update = PollUpdate::new(job_id, poll, max_polls, &state);
            tracing::debug!(
                job_id,
                poll,
                status = %update.status,
                progress = update.progress,
                "Transcription poll"
            );
            observer.on_poll(&update).await;

            match state {
                TranscriptPoll::Completed(result) => {
                    tracing::info!(job_id, polls = poll, "Transcription completed");
                    return Ok(result);
                }
                TranscriptPoll::Failed(reason) => {
                    tracing::error!(job_id, reason = %reason, "Transcription provider reported failure");
                    return Err(TranscriptionError::Failed(reason));
                }
                TranscriptPoll::Queued | TranscriptPoll::Processing => {}
            }

            if poll < max_polls {
                sleep(self.settings.interval).await;
            }
        }

        tracing::error!(job_id, polls = max_polls, "Transcription timed out");
        Err(TranscriptionError::Timeout { polls: max_polls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays scripted poll results, then repeats the fallback forever
    struct ScriptedTranscriber {
        script: Mutex<VecDeque<Result<TranscriptPoll, TranscriptionError>>>,
        fallback: TranscriptPoll,
        polls: AtomicU32,
    }

    impl ScriptedTranscriber {
        fn new(
            script: Vec<Result<TranscriptPoll, TranscriptionError>>,
            fallback: TranscriptPoll,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                polls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Transcriber for ScriptedTranscriber {
        async fn submit(
            &self,
            _audio: &AudioHandle,
            _options: &TranscriptionOptions,
        ) -> Result<String, TranscriptionError> {
            Ok("job-1".to_string())
        }

        async fn poll(&self, _job_id: &str) -> Result<TranscriptPoll, TranscriptionError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        updates: Mutex<Vec<PollUpdate>>,
    }

    #[async_trait]
    impl PollObserver for RecordingObserver {
        async fn on_poll(&self, update: &PollUpdate) {
            self.updates.lock().unwrap().push(update.clone());
        }
    }

    fn processor(transcriber: Arc<ScriptedTranscriber>) -> TranscriptionProcessor {
        TranscriptionProcessor::new(
            transcriber,
            PollSettings::default(),
            RetryPolicy::new(3, Duration::from_secs(1)),
        )
    }

    #[test]
    fn test_progress_mapping() {
        assert_eq!(progress_for(JobStatus::Queued, 1, 60), 10);
        assert_eq!(progress_for(JobStatus::Processing, 30, 60), 50);
        assert_eq!(progress_for(JobStatus::Processing, 60, 60), 90);
        assert_eq!(progress_for(JobStatus::Completed, 3, 60), 100);
        assert_eq!(progress_for(JobStatus::Processing, 1, 0), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_job_times_out_after_ceiling() {
        let transcriber = ScriptedTranscriber::new(vec![], TranscriptPoll::Processing);
        let processor = processor(transcriber.clone());
        let observer = RecordingObserver::default();

        let started = tokio::time::Instant::now();
        let err = processor
            .wait_for_completion("job-1", &observer)
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::Timeout { polls: 60 }));
        assert_eq!(transcriber.polls.load(Ordering::SeqCst), 60);
        assert_eq!(observer.updates.lock().unwrap().len(), 60);
        assert!(started.elapsed() <= Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_holds_when_polls_fail_transiently() {
        // Every logical poll hits two 503s before reporting `processing`
        let script = (0..60)
            .flat_map(|_| {
                [
                    Err(TranscriptionError::Server { status: 503 }),
                    Err(TranscriptionError::Server { status: 503 }),
                    Ok(TranscriptPoll::Processing),
                ]
            })
            .collect();
        let transcriber = ScriptedTranscriber::new(script, TranscriptPoll::Processing);
        let processor = processor(transcriber.clone());
        let observer = RecordingObserver::default();

        let started = tokio::time::Instant::now();
        let err = processor
            .wait_for_completion("job-1", &observer)
            .await
            .unwrap_err();

        assert!(started.elapsed() <= Duration::from_secs(300));
        let TranscriptionError::Timeout { polls } = err else {
            panic!("expected timeout, got {:?}", err);
        };
        assert!(polls < 60);
        assert_eq!(observer.updates.lock().unwrap().len() as u32, polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_deadline_cuts_polling_short() {
        let transcriber = ScriptedTranscriber::new(vec![], TranscriptPoll::Processing);
        let processor = TranscriptionProcessor::new(
            transcriber.clone(),
            PollSettings::default().with_deadline(Duration::from_secs(12)),
            RetryPolicy::new(3, Duration::from_secs(1)),
        );

        let started = tokio::time::Instant::now();
        let err = processor
            .wait_for_completion("job-1", &NoopObserver)
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::Timeout { polls: 3 }));
        assert_eq!(transcriber.polls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_fails_without_retry() {
        let transcriber = ScriptedTranscriber::new(
            vec![Ok(TranscriptPoll::Failed("audio unreadable".into()))],
            TranscriptPoll::Processing,
        );
        let processor = processor(transcriber.clone());

        let err = processor
            .wait_for_completion("job-1", &NoopObserver)
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::Failed(ref msg) if msg == "audio unreadable"));
        assert_eq!(transcriber.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_retried() {
        let result = TranscriptResult {
            text: "hello world".into(),
            ..Default::default()
        };
        let transcriber = ScriptedTranscriber::new(
            vec![
                Ok(TranscriptPoll::Queued),
                Err(TranscriptionError::Server { status: 503 }),
                Ok(TranscriptPoll::Completed(result.clone())),
            ],
            TranscriptPoll::Processing,
        );
        let processor = processor(transcriber.clone());
        let observer = RecordingObserver::default();

        let transcript = processor
            .wait_for_completion("job-1", &observer)
            .await
            .unwrap();

        assert_eq!(transcript, result);
        assert_eq!(transcriber.polls.load(Ordering::SeqCst), 3);

        let updates = observer.updates.lock().unwrap();
        let progress: Vec<u8> = updates.iter().map(|u| u.progress).collect();
        assert_eq!(progress, vec![10, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_every_poll() {
        let transcriber = ScriptedTranscriber::new(
            vec![
                Ok(TranscriptPoll::Processing),
                Ok(TranscriptPoll::Processing),
                Ok(TranscriptPoll::Processing),
                Ok(TranscriptPoll::Completed(TranscriptResult::default())),
            ],
            TranscriptPoll::Processing,
        );
        let processor = processor(transcriber);
        let observer = RecordingObserver::default();

        processor
            .wait_for_completion("job-1", &observer)
            .await
            .unwrap();

        let updates = observer.updates.lock().unwrap();
        assert_eq!(updates.len(), 4);
        assert!(updates.windows(2).all(|w| w[0].progress <= w[1].progress));
        assert_eq!(updates.last().unwrap().status, JobStatus::Completed);
    }
}
