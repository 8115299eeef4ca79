//! Transcript and video metadata inputs.
//!
//! These shapes arrive from the (out-of-scope) transcription and metadata
//! collaborators; the engine treats them as read-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timed slice of transcribed speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds from the beginning of the video
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    /// Transcribed text for this segment
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// A full transcript for one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Source video identifier
    pub video_id: String,

    /// Full transcript text (concatenation of segments when timed)
    pub text: String,

    /// Timed segments. May be empty when the transcription backend could
    /// not produce timing metadata; the chunker falls back to fixed-size
    /// word chunking in that case.
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,

    /// Detected language code (en, de, ...)
    pub language: Option<String>,
}

impl Transcript {
    /// Create a transcript from timed segments; `text` is derived.
    pub fn from_segments(video_id: impl Into<String>, segments: Vec<TranscriptSegment>) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            video_id: video_id.into(),
            text,
            segments,
            language: None,
        }
    }

    /// Create an untimed transcript (plain text only).
    pub fn from_text(video_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            text: text.into(),
            segments: Vec::new(),
            language: None,
        }
    }

    /// Set the language code.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Whether timing metadata is available.
    pub fn has_timing(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Total spoken duration covered by the segments, in seconds.
    pub fn duration(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }
}

/// Metadata for the video a transcript came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub channel_name: String,
    pub channel_id: String,
    pub source_url: String,
    pub duration_seconds: u64,
    pub published_at: Option<DateTime<Utc>>,
}

impl VideoMetadata {
    pub fn new(
        title: impl Into<String>,
        channel_name: impl Into<String>,
        channel_id: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            channel_name: channel_name.into(),
            channel_id: channel_id.into(),
            source_url: source_url.into(),
            duration_seconds: 0,
            published_at: None,
        }
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}

/// Which extraction schema and prompt template to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// News facts from reporting/commentary channels
    News,

    /// Positions and arguments from debate-style content
    Debate,

    /// Developer actions (releases, updates, announcements)
    Dev,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::News => "news",
            SourceType::Debate => "debate",
            SourceType::Dev => "dev",
        }
    }
}
