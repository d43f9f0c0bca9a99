use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::store::{Document, DocumentStatus, VideoMetadata};
use crate::utils::{format_duration, format_timestamp};

/// Render a document in the requested format
pub fn render(document: &Document, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_as_text(document)),
        OutputFormat::Json => format_as_json(document),
        OutputFormat::Markdown => Ok(format_as_markdown(document)),
    }
}

/// Save a document to file
pub async fn save_to_file(document: &Document, path: &Path, format: OutputFormat) -> Result<()> {
    let content = render(document, format)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Print a document to console
pub fn print_to_console(document: &Document, format: OutputFormat) -> Result<()> {
    println!("{}", render(document, format)?);
    Ok(())
}

pub fn format_as_json(document: &Document) -> Result<String> {
    serde_json::to_string_pretty(document).context("Failed to serialize document")
}

fn title_of(document: &Document) -> &str {
    document
        .video_metadata()
        .and_then(|m| m.title.as_deref())
        .unwrap_or(&document.source_reference)
}

pub fn format_as_text(document: &Document) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", title_of(document));
    let _ = writeln!(out, "Document: {} ({})", document.id, document.status);
    let _ = writeln!(out, "Source: {}", document.source_reference);

    if let Some(meta) = document.video_metadata() {
        if let Some(channel) = &meta.channel_title {
            let _ = writeln!(out, "Channel: {}", channel);
        }
        if let Some(seconds) = meta.duration_seconds {
            let _ = writeln!(out, "Duration: {}", format_duration(seconds));
        }
    }

    match document.status {
        DocumentStatus::Completed => {
            if let Some(summary) = document.video_metadata().and_then(|m| m.summary.as_deref()) {
                let _ = writeln!(out, "\nSummary: {}", summary);
            }
            if let Some(content) = &document.content {
                let _ = writeln!(out, "\n{}", content);
            }
        }
        DocumentStatus::Error => {
            let message = document.error_message.as_deref().unwrap_or("Unknown error");
            let _ = writeln!(out, "\nError: {}", message);
        }
        DocumentStatus::Pending | DocumentStatus::Processing => {
            let _ = writeln!(out, "\nNot finished yet.");
        }
    }

    out.trim_end().to_string()
}

fn push_markdown_metadata(out: &mut String, meta: &VideoMetadata) {
    if let Some(summary) = &meta.summary {
        let _ = writeln!(out, "> {}\n", summary);
    }

    if !meta.key_points.is_empty() {
        let _ = writeln!(out, "## Key Points\n");
        for point in &meta.key_points {
            let _ = writeln!(out, "- {}", point);
        }
        out.push('\n');
    }

    if !meta.chapters.is_empty() {
        let _ = writeln!(out, "## Chapters\n");
        for chapter in &meta.chapters {
            let _ = writeln!(
                out,
                "- [{} - {}] {}",
                format_timestamp(chapter.start_ms),
                format_timestamp(chapter.end_ms),
                chapter.title
            );
        }
        out.push('\n');
    }
}

pub fn format_as_markdown(document: &Document) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", title_of(document));

    let meta = document.video_metadata();
    let mut facts = vec![format!("**Source:** {}", document.source_reference)];
    if let Some(channel) = meta.and_then(|m| m.channel_title.as_deref()) {
        facts.push(format!("**Channel:** {}", channel));
    }
    if let Some(seconds) = meta.and_then(|m| m.duration_seconds) {
        facts.push(format!("**Duration:** {}", format_duration(seconds)));
    }
    if let Some(minutes) = meta.and_then(|m| m.estimated_reading_minutes) {
        facts.push(format!("**Reading time:** {} min", minutes));
    }
    let _ = writeln!(out, "{}\n", facts.join(" | "));

    match document.status {
        DocumentStatus::Completed => {
            if let Some(meta) = meta {
                push_markdown_metadata(&mut out, meta);
            }
            if let Some(content) = &document.content {
                let _ = writeln!(out, "---\n\n{}", content);
            }
        }
        DocumentStatus::Error => {
            let message = document.error_message.as_deref().unwrap_or("Unknown error");
            let _ = writeln!(out, "**Error:** {}", message);
        }
        status => {
            let _ = writeln!(out, "_Status: {}_", status);
        }
    }

    out.trim_end().to_string()
}
