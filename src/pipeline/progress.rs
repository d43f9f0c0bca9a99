use async_trait::async_trait;
use std::sync::Arc;

use crate::store::{DocumentStore, JobUpdate};
use crate::transcribe::{PollObserver, PollUpdate};

/// Mirrors every transcription poll onto the document's processing job row.
///
/// Job rows are display state, so a failed write is logged and the poll loop
/// carries on.
pub struct JobProgressObserver {
    store: Arc<dyn DocumentStore>,
    job_id: String,
    forward: Option<Arc<dyn PollObserver>>,
}

impl JobProgressObserver {
    pub fn new(store: Arc<dyn DocumentStore>, job_id: impl Into<String>) -> Self {
        Self {
            store,
            job_id: job_id.into(),
            forward: None,
        }
    }

    /// Also pass each update to `observer`, e.g. a terminal progress bar
    pub fn forwarding_to(mut self, observer: Option<Arc<dyn PollObserver>>) -> Self {
        self.forward = observer;
        self
    }
}

#[async_trait]
impl PollObserver for JobProgressObserver {
    async fn on_poll(&self, update: &PollUpdate) {
        let row = JobUpdate {
            status: update.status,
            progress: update.progress,
            status_message: Some(update.message.clone()),
            error_message: None,
        };

        if let Err(e) = self.store.update_job(&self.job_id, &row).await {
            tracing::warn!(job_id = %self.job_id, "Failed to record job progress: {}", e);
        }

        if let Some(forward) = &self.forward {
            forward.on_poll(update).await;
        }
    }
}
