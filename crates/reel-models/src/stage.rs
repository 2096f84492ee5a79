//! Stage configuration and the fixed stage order.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

use crate::AspectRatio;

/// Maximum length of a literal headline, in characters.
pub const MAX_LITERAL_HEADLINE_CHARS: usize = 120;

/// Where the headline overlay text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "source", content = "text", rename_all = "snake_case")]
pub enum HeadlineSource {
    /// No overlay
    #[default]
    None,
    /// Text supplied by the caller
    Literal(String),
    /// Opening sentence of the transcript
    ExtractedHook,
    /// Text from the content generation service
    Generated,
}

impl HeadlineSource {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, HeadlineSource::None)
    }

    /// Whether resolving the text needs a transcript.
    pub fn needs_transcript(&self) -> bool {
        matches!(self, HeadlineSource::ExtractedHook | HeadlineSource::Generated)
    }
}

/// Immutable per-job stage flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[validate(schema(function = "validate_aspect_ratio"))]
pub struct StageConfig {
    /// Remove below-threshold silent gaps
    #[serde(default = "default_true")]
    pub trim_silence: bool,

    /// Loudness-normalize the audio track
    #[serde(default)]
    pub normalize_audio: bool,

    /// Remove fillers, repeats and false starts
    #[serde(default)]
    pub speech_correction: bool,

    /// Burn timestamp-aligned captions
    #[serde(default)]
    pub captions: bool,

    /// Headline overlay source
    #[serde(default)]
    #[validate(custom(function = "validate_headline"))]
    pub headline: HeadlineSource,

    /// Target aspect ratio (no conversion when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
}

fn default_true() -> bool {
    true
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            trim_silence: true,
            normalize_audio: false,
            speech_correction: false,
            captions: false,
            headline: HeadlineSource::None,
            aspect_ratio: None,
        }
    }
}

impl StageConfig {
    /// Later stages need timestamps that match the working artifact exactly.
    pub fn needs_exact_transcript(&self) -> bool {
        self.captions || self.speech_correction
    }

    /// Any stage needs transcript text or timestamps.
    pub fn needs_transcript(&self) -> bool {
        self.needs_exact_transcript() || self.headline.needs_transcript()
    }
}

fn validate_headline(headline: &HeadlineSource) -> Result<(), ValidationError> {
    if let HeadlineSource::Literal(text) = headline {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::new("headline_empty"));
        }
        if trimmed.chars().count() > MAX_LITERAL_HEADLINE_CHARS {
            return Err(ValidationError::new("headline_too_long"));
        }
    }
    Ok(())
}

fn validate_aspect_ratio(config: &StageConfig) -> Result<(), ValidationError> {
    match config.aspect_ratio {
        Some(ratio) if !ratio.is_valid() => Err(ValidationError::new("aspect_ratio_zero")),
        _ => Ok(()),
    }
}

/// How a stage failure affects the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the job
    Fatal,
    /// Continue with the pre-stage artifact
    Degrade,
}

/// Pipeline stages in their fixed relative order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    TrimSilence,
    NormalizeAudio,
    /// Headline-only transcription of the original artifact
    EarlyTranscribe,
    Transcribe,
    SpeechCorrect,
    /// Transcription after speech correction shifted timestamps
    Retranscribe,
    BurnCaptions,
    OverlayHeadline,
    ConvertAspectRatio,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::TrimSilence,
        Stage::NormalizeAudio,
        Stage::EarlyTranscribe,
        Stage::Transcribe,
        Stage::SpeechCorrect,
        Stage::Retranscribe,
        Stage::BurnCaptions,
        Stage::OverlayHeadline,
        Stage::ConvertAspectRatio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::TrimSilence => "trim-silence",
            Stage::NormalizeAudio => "normalize-audio",
            Stage::EarlyTranscribe => "early-transcribe",
            Stage::Transcribe => "transcribe",
            Stage::SpeechCorrect => "speech-correct",
            Stage::Retranscribe => "retranscribe",
            Stage::BurnCaptions => "burn-captions",
            Stage::OverlayHeadline => "overlay-headline",
            Stage::ConvertAspectRatio => "convert-aspect-ratio",
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        match self {
            Stage::EarlyTranscribe | Stage::Retranscribe | Stage::OverlayHeadline => {
                FailurePolicy::Degrade
            }
            _ => FailurePolicy::Fatal,
        }
    }

    /// Whether the stage produces a new working artifact.
    pub fn produces_artifact(&self) -> bool {
        !matches!(
            self,
            Stage::EarlyTranscribe | Stage::Transcribe | Stage::Retranscribe
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
