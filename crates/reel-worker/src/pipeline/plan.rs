//! Stage activation from a job's Stage Config.

use reel_models::{Stage, StageConfig};

/// The activated stages of one job, in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    pub fn from_config(config: &StageConfig) -> Self {
        let stages = Stage::ALL
            .iter()
            .copied()
            .filter(|stage| is_active(*stage, config))
            .collect();
        Self { stages }
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

fn is_active(stage: Stage, config: &StageConfig) -> bool {
    match stage {
        Stage::TrimSilence => config.trim_silence,
        Stage::NormalizeAudio => config.normalize_audio,
        // Headline-only text tolerates pre-trim timestamps, so it can overlap with trimming.
        Stage::EarlyTranscribe => {
            config.headline.needs_transcript() && !config.needs_exact_transcript()
        }
        Stage::Transcribe => config.needs_exact_transcript(),
        Stage::SpeechCorrect => config.speech_correction,
        // Still skipped at run time when correction removed nothing.
        Stage::Retranscribe => config.speech_correction && config.captions,
        Stage::BurnCaptions => config.captions,
        Stage::OverlayHeadline => config.headline.is_enabled(),
        Stage::ConvertAspectRatio => config.aspect_ratio.is_some(),
    }
}
