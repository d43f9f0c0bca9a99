use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::summarize::{DocumentFormat, OutputType, SkillLevel, StyleConfig, Tone};

#[derive(Parser)]
#[command(
    name = "vidscribe",
    about = "Vidscribe - Turn YouTube videos into written documents",
    version,
    long_about = "Downloads the audio of a video, transcribes it with a speech-recognition service and turns the transcript into a structured document with a text-generation service. Usage is metered per account and month."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create documents from one or more video URLs
    Process {
        /// Video URLs (youtube.com, youtu.be, embed and shorts links)
        #[arg(value_name = "URL", required = true, num_args = 1..)]
        urls: Vec<String>,

        /// Account the documents belong to and are metered against
        #[arg(short, long, value_name = "ID", default_value = "local")]
        account: String,

        #[command(flatten)]
        style: StyleArgs,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format (defaults to the configured format)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Show a stored document
    Show {
        /// Document id printed by `process`
        #[arg(value_name = "DOCUMENT_ID")]
        id: String,

        /// Output format (defaults to the configured format)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// List an account's documents
    List {
        #[arg(short, long, value_name = "ID", default_value = "local")]
        account: String,
    },

    /// Show this month's usage for an account
    Usage {
        #[arg(short, long, value_name = "ID", default_value = "local")]
        account: String,
    },

    /// List subscription tiers and their limits
    Limits,

    /// Show or create the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

/// How generated documents should read
#[derive(clap::Args, Debug, Clone, Default)]
pub struct StyleArgs {
    /// Document type
    #[arg(long = "type", value_enum, default_value_t = OutputType::default())]
    pub output_type: OutputType,

    /// Target reader
    #[arg(long = "level", value_enum, default_value_t = SkillLevel::default())]
    pub skill_level: SkillLevel,

    #[arg(long, value_enum, default_value_t = Tone::default())]
    pub tone: Tone,

    /// Markup of the generated content
    #[arg(long = "markup", value_enum, default_value_t = DocumentFormat::default())]
    pub markup: DocumentFormat,
}

impl From<StyleArgs> for StyleConfig {
    fn from(args: StyleArgs) -> Self {
        StyleConfig {
            format: args.markup,
            tone: args.tone,
            skill_level: args.skill_level,
            output_type: args.output_type,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON document row
    Json,
    /// Markdown with metadata sections
    Markdown,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}
