//! Output style presets and prompt construction

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Markup of the generated document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentFormat {
    #[default]
    Markdown,
    Plain,
}

impl DocumentFormat {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Plain => "plain",
        }
    }

    const fn guidance(&self) -> &'static str {
        match self {
            Self::Markdown => "Format the content as Markdown with headings, lists and code blocks where useful.",
            Self::Plain => "Write the content as plain text paragraphs without any markup.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Academic,
    Friendly,
}

impl Tone {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Casual => "casual",
            Self::Academic => "academic",
            Self::Friendly => "friendly",
        }
    }

    const fn guidance(&self) -> &'static str {
        match self {
            Self::Professional => "Use a clear, professional tone.",
            Self::Casual => "Use a relaxed, conversational tone.",
            Self::Academic => "Use a precise academic tone and define terms before using them.",
            Self::Friendly => "Use a warm, encouraging tone that speaks directly to the reader.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SkillLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl SkillLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }

    const fn guidance(&self) -> &'static str {
        match self {
            Self::Beginner => "Assume no prior knowledge. Explain every concept and avoid unexplained jargon.",
            Self::Intermediate => "Assume working familiarity with the basics and focus on practical detail.",
            Self::Advanced => "Assume expert readers. Skip fundamentals and go deep on nuance and trade-offs.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputType {
    #[default]
    Tutorial,
    Summary,
    Article,
    StudyNotes,
    BlogPost,
}

impl OutputType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tutorial => "tutorial",
            Self::Summary => "summary",
            Self::Article => "article",
            Self::StudyNotes => "study-notes",
            Self::BlogPost => "blog-post",
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Tutorial => "Tutorial",
            Self::Summary => "Summary",
            Self::Article => "Article",
            Self::StudyNotes => "Study Notes",
            Self::BlogPost => "Blog Post",
        }
    }

    const fn guidance(&self) -> &'static str {
        match self {
            Self::Tutorial => "Write a step-by-step tutorial with numbered steps and a short recap.",
            Self::Summary => "Write a concise summary that keeps only the essential ideas.",
            Self::Article => "Write a well-structured article with an introduction, body sections and a conclusion.",
            Self::StudyNotes => "Write study notes with definitions, bullet points and review questions.",
            Self::BlogPost => "Write an engaging blog post with a hook, subheadings and a call to action.",
        }
    }
}

/// How the generated document should read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleConfig {
    pub format: DocumentFormat,
    pub tone: Tone,
    pub skill_level: SkillLevel,
    pub output_type: OutputType,
}

impl fmt::Display for StyleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, {})",
            self.output_type.as_str(),
            self.skill_level.as_str(),
            self.tone.as_str(),
            self.format.as_str()
        )
    }
}

const RESPONSE_CONTRACT: &str = r#"Respond with a single JSON object and nothing else, using exactly this shape:
{
  "content": string,
  "summary": string,
  "keyPoints": [string],
  "sentiment": "positive" | "neutral" | "negative",
  "topics": [string],
  "metadata": { "wordCount": number, "estimatedReadingTime": number }
}
"estimatedReadingTime" is in whole minutes."#;

/// Build the system message for a style
pub fn system_prompt(style: &StyleConfig) -> String {
    format!(
        "You turn video transcripts into high quality written documents.\n\n\
         Document type: {}. {}\n\
         Audience: {}. {}\n\
         Tone: {}\n\
         Format: {}\n\n\
         Use only information present in the transcript. Remove filler words, \
         false starts and sponsor segments.\n\n{}",
        style.output_type.label(),
        style.output_type.guidance(),
        style.skill_level.as_str(),
        style.skill_level.guidance(),
        style.tone.guidance(),
        style.format.guidance(),
        RESPONSE_CONTRACT
    )
}

/// Build the user message carrying the transcript
pub fn user_prompt(transcript: &str, title: Option<&str>) -> String {
    match title {
        Some(title) => format!("Video title: {}\n\nTranscript:\n{}", title, transcript),
        None => format!("Transcript:\n{}", transcript),
    }
}
