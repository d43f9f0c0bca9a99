use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::OutputFormat;
use crate::quota::{StaticBilling, Tier};
use crate::transcribe::PollSettings;
use crate::utils::{mask_secret, RetryPolicy};

pub const ASSEMBLYAI_API_KEY_ENV: &str = "ASSEMBLYAI_API_KEY";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const YOUTUBE_API_KEY_ENV: &str = "YOUTUBE_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External provider settings
    pub providers: ProvidersConfig,

    /// Retry budget for transient provider failures
    pub retry: RetryConfig,

    /// Subscription tiers
    pub billing: BillingConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub transcription: TranscriptionProviderConfig,
    pub generation: GenerationProviderConfig,
    pub youtube: YoutubeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionProviderConfig {
    pub base_url: String,

    pub api_key: Option<String>,

    /// Seconds between status polls
    pub poll_interval_secs: u64,

    /// Polls before the job is considered timed out
    pub max_polls: u32,
}

impl Default for TranscriptionProviderConfig {
    fn default() -> Self {
        Self {
            base_url: crate::transcribe::assemblyai::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            poll_interval_secs: 5,
            max_polls: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl Default for GenerationProviderConfig {
    fn default() -> Self {
        Self {
            base_url: crate::summarize::openai::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: crate::summarize::openai::DEFAULT_MODEL.to_string(),
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    /// YouTube Data API base URL
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub yt_dlp_path: String,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_base_url: crate::extractors::youtube::DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            yt_dlp_path: "yt-dlp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Tier for accounts without an explicit entry
    pub default_tier: Tier,

    /// Per-account tier overrides
    pub accounts: HashMap<String, Tier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file; defaults to the user data directory
    pub database_path: Option<PathBuf>,

    /// Temporary directory for downloads
    pub temp_dir: Option<PathBuf>,

    /// Default output format
    pub default_output_format: OutputFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            temp_dir: None,
            default_output_format: OutputFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from file or create default, then apply env overrides
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            config
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs_err::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let local_config = PathBuf::from("vidscribe.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("vidscribe").join("config.yaml"))
    }

    /// Environment variables win over keys in the file
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ASSEMBLYAI_API_KEY_ENV) {
            self.providers.transcription.api_key = Some(key);
        }
        if let Some(key) = non_empty(OPENAI_API_KEY_ENV) {
            self.providers.generation.api_key = Some(key);
        }
        if let Some(key) = non_empty(YOUTUBE_API_KEY_ENV) {
            self.providers.youtube.api_key = Some(key);
        }
    }

    /// Structural checks that apply to every command
    fn validate(&self) -> Result<()> {
        if self.providers.transcription.max_polls == 0 {
            anyhow::bail!("providers.transcription.max_polls must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.providers.generation.temperature) {
            anyhow::bail!("providers.generation.temperature must be between 0 and 2");
        }
        Ok(())
    }

    /// Every key the pipeline needs must be present
    pub fn validate_for_processing(&self) -> Result<()> {
        let missing: Vec<&str> = [
            (&self.providers.youtube.api_key, YOUTUBE_API_KEY_ENV),
            (&self.providers.transcription.api_key, ASSEMBLYAI_API_KEY_ENV),
            (&self.providers.generation.api_key, OPENAI_API_KEY_ENV),
        ]
        .into_iter()
        .filter(|(key, _)| key.as_deref().map_or(true, |k| k.trim().is_empty()))
        .map(|(_, env)| env)
        .collect();

        if !missing.is_empty() {
            anyhow::bail!(
                "Missing API keys: {}. Set them in the environment or in {}",
                missing.join(", "),
                Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "the config file".to_string())
            );
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings::new(
            Duration::from_secs(self.providers.transcription.poll_interval_secs),
            self.providers.transcription.max_polls,
        )
    }

    pub fn billing(&self) -> StaticBilling {
        StaticBilling::with_accounts(self.billing.default_tier, self.billing.accounts.clone())
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.app.database_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().context("Could not determine data directory")?;
        Ok(data_dir.join("vidscribe").join("vidscribe.db"))
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.app.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Display current configuration with secrets masked
    pub fn display(&self) {
        let key = |k: &Option<String>| k.as_deref().map(mask_secret).unwrap_or_else(|| "(not set)".to_string());

        println!("Current Configuration:");
        println!("  Transcription:");
        println!("    Base URL: {}", self.providers.transcription.base_url);
        println!("    API Key: {}", key(&self.providers.transcription.api_key));
        println!(
            "    Polling: every {}s, at most {} polls",
            self.providers.transcription.poll_interval_secs, self.providers.transcription.max_polls
        );
        println!("  Generation:");
        println!("    Base URL: {}", self.providers.generation.base_url);
        println!("    API Key: {}", key(&self.providers.generation.api_key));
        println!("    Model: {}", self.providers.generation.model);
        println!("    Temperature: {}", self.providers.generation.temperature);
        println!("  YouTube:");
        println!("    API Key: {}", key(&self.providers.youtube.api_key));
        println!("    yt-dlp: {}", self.providers.youtube.yt_dlp_path);
        println!(
            "  Retry: {} attempts, {}ms base delay",
            self.retry.max_attempts, self.retry.base_delay_ms
        );
        println!("  Default Tier: {}", self.billing.default_tier);
        for (account, tier) in &self.billing.accounts {
            println!("    {}: {}", account, tier);
        }
        match self.database_path() {
            Ok(path) => println!("  Database: {}", path.display()),
            Err(_) => println!("  Database: (unresolved)"),
        }
        println!("  Default Format: {}", self.app.default_output_format);
    }
}
