//! Configuration for silence trimming.

use serde::{Deserialize, Serialize};

/// Tuning for `silencedetect`-based trimming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilenceTrimConfig {
    /// Noise floor in dBFS; anything quieter counts as silence.
    pub noise_db: f64,

    /// Minimum silence duration before it is cut (milliseconds).
    ///
    /// Natural pauses shorter than this are preserved.
    pub min_silence_ms: u64,

    /// Padding kept before speech resumes (milliseconds).
    ///
    /// Keeps the attack of the first consonant.
    pub pre_speech_padding_ms: u64,

    /// Padding kept after speech ends (milliseconds).
    pub post_speech_padding_ms: u64,

    /// Skip trimming if less than this share of the input would remain.
    pub min_keep_ratio: f64,

    /// Skip trimming unless at least this share of the input would be cut.
    pub min_cut_ratio: f64,
}

impl Default for SilenceTrimConfig {
    fn default() -> Self {
        Self {
            noise_db: -35.0,
            min_silence_ms: 1000,
            pre_speech_padding_ms: 200,
            post_speech_padding_ms: 200,
            min_keep_ratio: 0.1,
            min_cut_ratio: 0.10,
        }
    }
}

impl SilenceTrimConfig {
    /// Load overrides from `SILENCE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            noise_db: env_parse("SILENCE_NOISE_DB").unwrap_or(defaults.noise_db),
            min_silence_ms: env_parse("SILENCE_MIN_MS").unwrap_or(defaults.min_silence_ms),
            pre_speech_padding_ms: env_parse("SILENCE_PRE_PADDING_MS")
                .unwrap_or(defaults.pre_speech_padding_ms),
            post_speech_padding_ms: env_parse("SILENCE_POST_PADDING_MS")
                .unwrap_or(defaults.post_speech_padding_ms),
            min_keep_ratio: env_parse("SILENCE_MIN_KEEP_RATIO").unwrap_or(defaults.min_keep_ratio),
            min_cut_ratio: env_parse("SILENCE_MIN_CUT_RATIO").unwrap_or(defaults.min_cut_ratio),
        }
    }

    /// Builder-style setter for minimum silence duration.
    pub fn with_min_silence_ms(mut self, ms: u64) -> Self {
        self.min_silence_ms = ms;
        self
    }

    /// Builder-style setter for both paddings.
    pub fn with_padding_ms(mut self, pre: u64, post: u64) -> Self {
        self.pre_speech_padding_ms = pre;
        self.post_speech_padding_ms = post;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
