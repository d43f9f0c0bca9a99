use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use console::style;
use futures_util::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidscribe::cli::{Cli, Commands, OutputFormat};
use vidscribe::config::Config;
use vidscribe::output;
use vidscribe::pipeline::{DocumentLifecycleManager, PipelineSettings};
use vidscribe::quota::{BillingProvider, ALL_TIERS};
use vidscribe::store::{Document, DocumentStore, SqliteStore};
use vidscribe::summarize::{OpenAiGenerator, StyleConfig, Summarizer};
use vidscribe::transcribe::{AssemblyAiTranscriber, PollObserver, PollUpdate, TranscriptionProcessor};
use vidscribe::utils::format_duration;
use vidscribe::YoutubeResolver;

fn init_tracing(cli: &Cli) {
    let default_filter = if cli.verbose { "vidscribe=debug" } else { "vidscribe=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Shows transcription polls on a terminal spinner
struct SpinnerObserver {
    bar: ProgressBar,
}

impl SpinnerObserver {
    fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        };
        Self { bar }
    }
}

#[async_trait]
impl PollObserver for SpinnerObserver {
    async fn on_poll(&self, update: &PollUpdate) {
        self.bar.set_message(format!(
            "[{}] {} ({}%)",
            update.job_id, update.message, update.progress
        ));
    }
}

fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let path = config.database_path()?;
    let store = SqliteStore::open(&path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_manager(
    config: &Config,
    store: Arc<SqliteStore>,
    observer: Arc<dyn PollObserver>,
) -> DocumentLifecycleManager {
    let providers = &config.providers;
    let retry = config.retry_policy();

    let media = YoutubeResolver::new(providers.youtube.api_key.clone().unwrap_or_default())
        .with_api_base_url(&providers.youtube.api_base_url)
        .with_yt_dlp_path(&providers.youtube.yt_dlp_path);

    let transcriber = AssemblyAiTranscriber::new(providers.transcription.api_key.clone().unwrap_or_default())
        .with_base_url(&providers.transcription.base_url);

    let generator = OpenAiGenerator::new(providers.generation.api_key.clone().unwrap_or_default())
        .with_base_url(&providers.generation.base_url)
        .with_model(&providers.generation.model)
        .with_temperature(providers.generation.temperature);

    let settings = PipelineSettings {
        temp_dir: config.temp_dir(),
        metadata_retry: retry,
        ..Default::default()
    };

    DocumentLifecycleManager::new(
        store,
        Arc::new(media),
        TranscriptionProcessor::new(Arc::new(transcriber), config.poll_settings(), retry),
        Summarizer::new(Arc::new(generator), retry),
        Arc::new(config.billing()),
        settings,
    )
    .with_progress_observer(observer)
}

/// Output path for the n-th of several documents
fn numbered_path(path: &Path, document: &Document, total: usize) -> PathBuf {
    if total <= 1 {
        return path.to_path_buf();
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}-{}.{}", stem, document.id, ext),
        None => format!("{}-{}", stem, document.id),
    };
    path.with_file_name(name)
}

async fn run_process(
    config: &Config,
    quiet: bool,
    urls: Vec<String>,
    account: String,
    doc_style: StyleConfig,
    output_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<bool> {
    config.validate_for_processing()?;

    let spinner = Arc::new(SpinnerObserver::new(quiet));
    let store = open_store(config)?;
    let manager = build_manager(config, store, spinner.clone());

    let resolver = YoutubeResolver::new("").with_yt_dlp_path(&config.providers.youtube.yt_dlp_path);
    if !resolver.check_availability().await {
        eprintln!(
            "{} yt-dlp was not found at '{}'; downloads will fail",
            style("warning:").yellow().bold(),
            config.providers.youtube.yt_dlp_path
        );
    }

    spinner.bar.set_message(format!("Processing {} video(s)...", urls.len()));
    tracing::info!(count = urls.len(), account = %account, style = %doc_style, "Starting processing");

    let tasks = urls.iter().map(|url| {
        let manager = manager.clone();
        let account = account.clone();
        let url = url.clone();
        tokio::spawn(async move { manager.submit(&account, &url, doc_style).await })
    });
    let results = join_all(tasks).await;
    spinner.bar.finish_and_clear();

    let total = urls.len();
    let mut all_ok = true;
    for (url, joined) in urls.iter().zip(results) {
        let result = joined.context("Processing task panicked")?;
        match result {
            Ok(document) => {
                eprintln!("{} {} -> {}", style("✓").green().bold(), url, document.id);
                match &output_path {
                    Some(path) => {
                        let path = numbered_path(path, &document, total);
                        output::save_to_file(&document, &path, format).await?;
                        println!("Document saved to: {}", path.display());
                    }
                    None => output::print_to_console(&document, format)?,
                }
            }
            Err(e) => {
                all_ok = false;
                tracing::debug!("Full error for {}: {:?}", url, e);
                eprintln!(
                    "{} {}: {} ({})",
                    style("✗").red().bold(),
                    url,
                    e.user_message(),
                    e.kind()
                );
            }
        }
    }

    Ok(all_ok)
}

async fn run_usage(config: &Config, account: &str) -> Result<()> {
    let store = open_store(config)?;
    let tier = config.billing().tier_for(account).await?;
    let limits = tier.limits();
    let usage = store.usage(account, &vidscribe::store::UsagePeriod::current()).await?;

    println!("Account: {} ({} tier)", style(account).bold(), tier);
    println!("Period:  {}", usage.period);
    match limits.documents_per_month {
        Some(max) => println!("Documents: {} / {}", usage.documents_processed, max),
        None => println!("Documents: {} (unlimited)", usage.documents_processed),
    }
    if limits.is_unlimited() {
        println!(
            "Video time: {} (max {} per video)",
            format_duration(usage.total_video_duration_seconds),
            format_duration(limits.max_video_duration_seconds)
        );
    } else {
        println!(
            "Video time: {} / {}",
            format_duration(usage.total_video_duration_seconds),
            format_duration(limits.max_video_duration_seconds)
        );
    }
    Ok(())
}

fn print_limits() {
    println!("Subscription tiers:");
    for tier in ALL_TIERS {
        let limits = tier.limits();
        let documents = limits
            .documents_per_month
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unlimited".to_string());
        let duration = if limits.is_unlimited() {
            format!("{} per video", format_duration(limits.max_video_duration_seconds))
        } else {
            format!("{} per month", format_duration(limits.max_video_duration_seconds))
        };
        println!("  • {:<10} {} documents/month, {}", tier.as_str(), documents, duration);
        println!(
            "    custom styles: {}, export formats: {}, priority processing: {}",
            limits.features.custom_styles,
            limits.features.export_formats,
            limits.features.priority_processing
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Commands::Limits = cli.command {
        print_limits();
        return Ok(());
    }

    let config = Config::load().await?;

    match cli.command {
        Commands::Process {
            urls,
            account,
            style,
            output,
            format,
        } => {
            let format = format.unwrap_or(config.app.default_output_format);
            let ok = run_process(&config, cli.quiet, urls, account, style.into(), output, format).await?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Show { id, format } => {
            let store = open_store(&config)?;
            let document = store
                .get_document(&id)
                .await?
                .with_context(|| format!("Document not found: {}", id))?;
            output::print_to_console(&document, format.unwrap_or(config.app.default_output_format))?;
        }
        Commands::List { account } => {
            let store = open_store(&config)?;
            let documents = store.list_documents(&account).await?;
            if documents.is_empty() {
                println!("No documents for {}", account);
            }
            for document in documents {
                let title = document
                    .video_metadata()
                    .and_then(|m| m.title.clone())
                    .unwrap_or_else(|| document.source_reference.clone());
                println!(
                    "{}  {:<10}  {}  {}",
                    document.id,
                    document.status,
                    document.created_at.format("%Y-%m-%d %H:%M"),
                    title
                );
            }
        }
        Commands::Usage { account } => run_usage(&config, &account).await?,
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Edit the config file to change settings:");
                println!("  {}", Config::config_path()?.display());
            }
        }
        Commands::Limits => print_limits(),
    }

    Ok(())
}
