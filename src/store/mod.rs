//! Persistence for documents, processing jobs and usage counters.
//!
//! The pipeline only talks to the [`DocumentStore`] port. State transitions
//! are conditional: an implementation must refuse to move a document out of a
//! terminal state and report that as [`StoreError::Conflict`].

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

pub mod migrations;
pub mod models;
pub mod sqlite;

pub use models::{
    Chapter, Document, DocumentMetadata, DocumentStatus, Entity, Highlight, JobStatus, JobUpdate,
    ManualMetadata, ProcessingJob, UsageCounter, UsagePeriod, VideoMetadata,
};
pub use sqlite::SqliteStore;

/// Errors from store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document {id} is {current}, cannot move to {target}")]
    Conflict {
        id: String,
        current: DocumentStatus,
        target: DocumentStatus,
    },

    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    #[error("Store task failed: {0}")]
    Task(String),
}

/// Port for the relational store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// An account's documents, newest first
    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>, StoreError>;

    /// `pending -> processing`
    async fn mark_processing(&self, id: &str) -> Result<(), StoreError>;

    /// Flush partial metadata while the document is `processing`
    async fn save_metadata(&self, id: &str, metadata: &DocumentMetadata) -> Result<(), StoreError>;

    /// `processing -> completed`; sets content, final metadata and `completed_at`
    async fn mark_completed(
        &self,
        id: &str,
        content: &str,
        metadata: &DocumentMetadata,
    ) -> Result<(), StoreError>;

    /// `pending | processing -> error`; clears any content
    async fn mark_error(&self, id: &str, message: &str) -> Result<(), StoreError>;

    async fn insert_job(&self, job: &ProcessingJob) -> Result<(), StoreError>;

    /// Progress is never lowered by an update
    async fn update_job(&self, job_id: &str, update: &JobUpdate) -> Result<(), StoreError>;

    async fn latest_job(&self, document_id: &str) -> Result<Option<ProcessingJob>, StoreError>;

    /// Counter for the period, zeroed if the account has no row yet
    async fn usage(&self, user_id: &str, period: &UsagePeriod) -> Result<UsageCounter, StoreError>;

    /// Atomically add one document and `duration_seconds` to the period's counter
    async fn increment_usage(
        &self,
        user_id: &str,
        period: &UsagePeriod,
        duration_seconds: u64,
    ) -> Result<UsageCounter, StoreError>;
}
