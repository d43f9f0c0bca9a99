//! Vidscribe - turn videos into written documents
//!
//! A video URL is resolved to audio, transcribed by a speech-recognition
//! provider and rewritten into a structured document by a text-generation
//! provider. Every document moves through `pending -> processing ->
//! completed | error`, and completed documents count against a monthly,
//! per-account quota.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod pipeline;
pub mod quota;
pub mod store;
pub mod summarize;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractors::{MediaResolver, VideoInfo, YoutubeResolver};
pub use pipeline::{DocumentLifecycleManager, ErrorKind, PipelineSettings, ProcessTrigger, ProcessingError};
pub use quota::{QuotaDecision, QuotaEvaluator, SubscriptionLimits, Tier, UsageRecorder};
pub use store::{Document, DocumentStatus, DocumentStore, SqliteStore};
pub use summarize::{DocumentGenerator, StyleConfig, Summarizer};
pub use transcribe::{Transcriber, TranscriptionProcessor};

/// Result type used at the binary edge
pub type Result<T> = anyhow::Result<T>;
