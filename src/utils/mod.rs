pub mod retry;

pub use retry::{with_retry, RetryPolicy};

use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client whose requests give up after `request_timeout`
pub fn http_client(request_timeout: Duration) -> reqwest::Client {
    match reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Failed to build HTTP client with timeouts, using defaults: {}", e);
            reqwest::Client::new()
        }
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Format a millisecond offset as `MM:SS` or `H:MM:SS`
pub fn format_timestamp(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

pub fn count_words(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Reading time at 200 words per minute, at least one minute
pub fn estimate_reading_minutes(word_count: u64) -> u32 {
    const WORDS_PER_MINUTE: u64 = 200;
    (word_count.div_ceil(WORDS_PER_MINUTE)).max(1) as u32
}

/// Mask a secret for display, keeping only the last four characters
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
