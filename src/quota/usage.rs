use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::store::{DocumentStore, StoreError, UsageCounter, UsagePeriod};

/// Adds a completed document to the account's monthly counters.
///
/// Only the lifecycle manager calls this, once, on `processing -> completed`.
#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn DocumentStore>,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn record_completion(
        &self,
        user_id: &str,
        duration_seconds: u64,
    ) -> Result<UsageCounter, StoreError> {
        self.record_completion_at(user_id, duration_seconds, Utc::now())
            .await
    }

    pub async fn record_completion_at(
        &self,
        user_id: &str,
        duration_seconds: u64,
        at: DateTime<Utc>,
    ) -> Result<UsageCounter, StoreError> {
        let period = UsagePeriod::containing(at);
        let counter = self
            .store
            .increment_usage(user_id, &period, duration_seconds)
            .await?;

        tracing::info!(
            user_id,
            period = %period,
            documents_processed = counter.documents_processed,
            total_seconds = counter.total_video_duration_seconds,
            "Usage recorded"
        );
        Ok(counter)
    }

    pub async fn current(&self, user_id: &str) -> Result<UsageCounter, StoreError> {
        self.store.usage(user_id, &UsagePeriod::current()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_counters_reset_at_month_boundary() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let recorder = UsageRecorder::new(store.clone());

        let january = Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 0).unwrap();
        let february = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        recorder
            .record_completion_at("acct-1", 300, january)
            .await
            .unwrap();
        let jan = recorder
            .record_completion_at("acct-1", 200, january)
            .await
            .unwrap();
        assert_eq!(jan.documents_processed, 2);
        assert_eq!(jan.total_video_duration_seconds, 500);

        let feb = recorder
            .record_completion_at("acct-1", 50, february)
            .await
            .unwrap();
        assert_eq!(feb.documents_processed, 1);
        assert_eq!(feb.total_video_duration_seconds, 50);

        let jan_again = store
            .usage("acct-1", &UsagePeriod::containing(january))
            .await
            .unwrap();
        assert_eq!(jan_again.documents_processed, 2);
    }

    #[tokio::test]
    async fn test_counters_never_decrease_within_month() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let recorder = UsageRecorder::new(store);

        let mut last = recorder.current("acct-1").await.unwrap();
        for seconds in [0, 45, 600, 1] {
            let next = recorder.record_completion("acct-1", seconds).await.unwrap();
            assert!(next.documents_processed > last.documents_processed);
            assert!(next.total_video_duration_seconds >= last.total_video_duration_seconds);
            last = next;
        }
    }
}
