//! SQLite adapter for [`DocumentStore`].
//!
//! All access is serialized through one `Mutex<Connection>` and runs on the
//! blocking pool, so async workers never wait on disk I/O.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::migrations;
use super::models::{
    Document, DocumentMetadata, DocumentStatus, JobUpdate, ProcessingJob, UsageCounter,
    UsagePeriod,
};
use super::{DocumentStore, StoreError};

/// Cloneable SQLite handle; clones share the same connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database file and runs pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;

        tracing::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    async fn run<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.with_conn(f))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn now_text() -> String {
    Utc::now().to_rfc3339()
}

fn parse_time(table: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}

fn encode_metadata(metadata: &DocumentMetadata) -> Result<String, StoreError> {
    serde_json::to_string(metadata).map_err(|e| StoreError::Corrupt {
        table: "documents",
        reason: format!("metadata not serializable: {}", e),
    })
}

/// Explains why a conditional update touched no row.
fn refusal(conn: &Connection, id: &str, target: DocumentStatus) -> StoreError {
    let current: Result<Option<String>, rusqlite::Error> = conn
        .query_row(
            "SELECT status FROM documents WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional();

    match current {
        Ok(Some(status)) => match status.parse::<DocumentStatus>() {
            Ok(current) => StoreError::Conflict {
                id: id.to_string(),
                current,
                target,
            },
            Err(reason) => StoreError::Corrupt {
                table: "documents",
                reason,
            },
        },
        Ok(None) => StoreError::NotFound(id.to_string()),
        Err(e) => StoreError::Sqlite(e),
    }
}

struct DocumentRow {
    id: String,
    user_id: String,
    status: String,
    source_reference: String,
    content: Option<String>,
    metadata: String,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            status: row.get("status")?,
            source_reference: row.get("source_reference")?,
            content: row.get("content")?,
            metadata: row.get("metadata")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    fn into_document(self) -> Result<Document, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            table: "documents",
            reason,
        };

        Ok(Document {
            status: self.status.parse().map_err(corrupt)?,
            metadata: serde_json::from_str(&self.metadata)
                .map_err(|e| corrupt(format!("bad metadata: {}", e)))?,
            created_at: parse_time("documents", &self.created_at)?,
            updated_at: parse_time("documents", &self.updated_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(|t| parse_time("documents", t))
                .transpose()?,
            id: self.id,
            user_id: self.user_id,
            source_reference: self.source_reference,
            content: self.content,
            error_message: self.error_message,
        })
    }
}

struct JobRow {
    id: String,
    document_id: String,
    provider_job_id: String,
    status: String,
    progress: i64,
    status_message: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            provider_job_id: row.get("provider_job_id")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            status_message: row.get("status_message")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_job(self) -> Result<ProcessingJob, StoreError> {
        Ok(ProcessingJob {
            status: self.status.parse().map_err(|reason| StoreError::Corrupt {
                table: "processing_jobs",
                reason,
            })?,
            progress: self.progress.clamp(0, 100) as u8,
            created_at: parse_time("processing_jobs", &self.created_at)?,
            updated_at: parse_time("processing_jobs", &self.updated_at)?,
            id: self.id,
            document_id: self.document_id,
            provider_job_id: self.provider_job_id,
            status_message: self.status_message,
            error_message: self.error_message,
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let doc = document.clone();
        let metadata = encode_metadata(&doc.metadata)?;
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO documents (id, user_id, status, source_reference, content, metadata,
                 error_message, created_at, updated_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    doc.id,
                    doc.user_id,
                    doc.status.as_str(),
                    doc.source_reference,
                    doc.content,
                    metadata,
                    doc.error_message,
                    doc.created_at.to_rfc3339(),
                    doc.updated_at.to_rfc3339(),
                    doc.completed_at.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let id = id.to_string();
        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM documents WHERE id = ?1",
                    params![id],
                    DocumentRow::from_row,
                )
                .optional()?;
            row.map(DocumentRow::into_document).transpose()
        })
        .await
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>, StoreError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM documents WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map(params![user_id], DocumentRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(DocumentRow::into_document).collect()
        })
        .await
    }

    async fn mark_processing(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE documents SET status = 'processing', updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![id, now_text()],
            )?;
            if changed == 0 {
                return Err(refusal(conn, &id, DocumentStatus::Processing));
            }
            Ok(())
        })
        .await
    }

    async fn save_metadata(&self, id: &str, metadata: &DocumentMetadata) -> Result<(), StoreError> {
        let id = id.to_string();
        let metadata = encode_metadata(metadata)?;
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE documents SET metadata = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'processing'",
                params![id, metadata, now_text()],
            )?;
            if changed == 0 {
                return Err(refusal(conn, &id, DocumentStatus::Processing));
            }
            Ok(())
        })
        .await
    }

    async fn mark_completed(
        &self,
        id: &str,
        content: &str,
        metadata: &DocumentMetadata,
    ) -> Result<(), StoreError> {
        let id = id.to_string();
        let content = content.to_string();
        let metadata = encode_metadata(metadata)?;
        self.run(move |conn| {
            let now = now_text();
            let changed = conn.execute(
                "UPDATE documents SET status = 'completed', content = ?2, metadata = ?3,
                 error_message = NULL, completed_at = ?4, updated_at = ?4
                 WHERE id = ?1 AND status = 'processing'",
                params![id, content, metadata, now],
            )?;
            if changed == 0 {
                return Err(refusal(conn, &id, DocumentStatus::Completed));
            }
            Ok(())
        })
        .await
    }

    async fn mark_error(&self, id: &str, message: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        let message = message.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE documents SET status = 'error', content = NULL, error_message = ?2,
                 updated_at = ?3
                 WHERE id = ?1 AND status IN ('pending', 'processing')",
                params![id, message, now_text()],
            )?;
            if changed == 0 {
                return Err(refusal(conn, &id, DocumentStatus::Error));
            }
            Ok(())
        })
        .await
    }

    async fn insert_job(&self, job: &ProcessingJob) -> Result<(), StoreError> {
        let job = job.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO processing_jobs (id, document_id, provider_job_id, status, progress,
                 status_message, error_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    job.id,
                    job.document_id,
                    job.provider_job_id,
                    job.status.as_str(),
                    i64::from(job.progress),
                    job.status_message,
                    job.error_message,
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_job(&self, job_id: &str, update: &JobUpdate) -> Result<(), StoreError> {
        let job_id = job_id.to_string();
        let update = update.clone();
        self.run(move |conn| {
            conn.execute(
                "UPDATE processing_jobs SET status = ?2, progress = MAX(progress, ?3),
                 status_message = ?4, error_message = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    job_id,
                    update.status.as_str(),
                    i64::from(update.progress.min(100)),
                    update.status_message,
                    update.error_message,
                    now_text(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn latest_job(&self, document_id: &str) -> Result<Option<ProcessingJob>, StoreError> {
        let document_id = document_id.to_string();
        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM processing_jobs WHERE document_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    params![document_id],
                    JobRow::from_row,
                )
                .optional()?;
            row.map(JobRow::into_job).transpose()
        })
        .await
    }

    async fn usage(&self, user_id: &str, period: &UsagePeriod) -> Result<UsageCounter, StoreError> {
        let user_id = user_id.to_string();
        let period = period.clone();
        self.run(move |conn| {
            let totals: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT documents_processed, total_video_duration_seconds
                     FROM usage_counters WHERE user_id = ?1 AND period = ?2",
                    params![user_id, period.as_str()],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;

            let mut counter = UsageCounter::empty(user_id, period);
            if let Some((documents, seconds)) = totals {
                counter.documents_processed = documents.max(0) as u64;
                counter.total_video_duration_seconds = seconds.max(0) as u64;
            }
            Ok(counter)
        })
        .await
    }

    async fn increment_usage(
        &self,
        user_id: &str,
        period: &UsagePeriod,
        duration_seconds: u64,
    ) -> Result<UsageCounter, StoreError> {
        let user_id = user_id.to_string();
        let period = period.clone();
        let seconds = i64::try_from(duration_seconds).unwrap_or(i64::MAX);
        self.run(move |conn| {
            // Single statement: concurrent completions cannot lose an update.
            let (documents, total): (i64, i64) = conn.query_row(
                "INSERT INTO usage_counters (user_id, period, documents_processed,
                 total_video_duration_seconds, updated_at)
                 VALUES (?1, ?2, 1, ?3, ?4)
                 ON CONFLICT(user_id, period) DO UPDATE SET
                   documents_processed = documents_processed + 1,
                   total_video_duration_seconds = total_video_duration_seconds + ?3,
                   updated_at = ?4
                 RETURNING documents_processed, total_video_duration_seconds",
                params![user_id, period.as_str(), seconds, now_text()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;

            Ok(UsageCounter {
                user_id,
                period,
                documents_processed: documents.max(0) as u64,
                total_video_duration_seconds: total.max(0) as u64,
            })
        })
        .await
    }
}
