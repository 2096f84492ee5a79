//! Media transform engine: one awaited call per post-production stage.
//!
//! Every operation reads `input` and writes a complete file at `output`;
//! `output` is only meaningful once the call returns `Ok`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reel_models::{keep_spans, AspectRatio, TimeSpan, Transcript};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::captions::{build_cues, to_srt};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{
    aspect_crop_filter, cover_crop_dims, headline_filter, keep_spans_filter,
    silence_detect_filter, subtitles_filter, FILTER_LOUDNORM, KEEP_AUDIO_LABEL, KEEP_VIDEO_LABEL,
};
use crate::probe::{probe_video, VideoInfo};
use crate::silence_removal::{plan_trim, SilenceTrimConfig};

/// What a trim-silence call did.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimOutcome {
    /// Whether any cut was rendered; `false` means output is a copy of input.
    pub applied: bool,
    /// Duration of the output in seconds.
    pub duration_secs: f64,
    /// Seconds removed from the input.
    pub removed_secs: f64,
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn trim_silence(&self, input: &Path, output: &Path) -> MediaResult<TrimOutcome>;

    async fn normalize_audio(&self, input: &Path, output: &Path) -> MediaResult<()>;

    /// Remove `cuts` from the timeline, closing the gaps.
    async fn cut_spans(&self, input: &Path, output: &Path, cuts: &[TimeSpan]) -> MediaResult<()>;

    /// Burn captions whose timings match `input`.
    async fn burn_captions(
        &self,
        input: &Path,
        output: &Path,
        transcript: &Transcript,
    ) -> MediaResult<()>;

    async fn overlay_headline(&self, input: &Path, output: &Path, text: &str) -> MediaResult<()>;

    async fn convert_aspect(
        &self,
        input: &Path,
        output: &Path,
        ratio: AspectRatio,
    ) -> MediaResult<()>;

    /// Duration in seconds.
    async fn duration(&self, input: &Path) -> MediaResult<f64>;
}

/// Encoder settings for [`FfmpegEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegEngineConfig {
    pub preset: String,
    pub crf: u8,
    pub audio_bitrate: String,
    /// Font for headline overlays; FFmpeg's default font when unset.
    pub font_file: Option<PathBuf>,
    pub silence: SilenceTrimConfig,
    /// Per-invocation ceiling for a single FFmpeg process.
    pub process_timeout_secs: Option<u64>,
}

impl Default for FfmpegEngineConfig {
    fn default() -> Self {
        Self {
            preset: "veryfast".to_string(),
            crf: 20,
            audio_bitrate: "128k".to_string(),
            font_file: None,
            silence: SilenceTrimConfig::default(),
            process_timeout_secs: None,
        }
    }
}

impl FfmpegEngineConfig {
    /// Load from `FFMPEG_*` and `SILENCE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            preset: std::env::var("FFMPEG_PRESET").unwrap_or(defaults.preset),
            crf: std::env::var("FFMPEG_CRF")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.crf),
            audio_bitrate: std::env::var("FFMPEG_AUDIO_BITRATE").unwrap_or(defaults.audio_bitrate),
            font_file: std::env::var("HEADLINE_FONT_FILE").ok().map(PathBuf::from),
            silence: SilenceTrimConfig::from_env(),
            process_timeout_secs: std::env::var("FFMPEG_PROCESS_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

/// [`MediaEngine`] backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine {
    config: FfmpegEngineConfig,
    runner: FfmpegRunner,
}

impl FfmpegEngine {
    pub fn new(config: FfmpegEngineConfig) -> Self {
        let runner = match config.process_timeout_secs {
            Some(secs) => FfmpegRunner::new().with_timeout(secs),
            None => FfmpegRunner::new(),
        };
        Self { config, runner }
    }

    pub fn config(&self) -> &FfmpegEngineConfig {
        &self.config
    }

    fn encode(&self, cmd: FfmpegCommand) -> FfmpegCommand {
        cmd.video_codec("libx264")
            .preset(self.config.preset.clone())
            .crf(self.config.crf)
            .audio_codec("aac")
            .audio_bitrate(self.config.audio_bitrate.clone())
            .faststart()
    }

    fn keep_spans_command(
        &self,
        input: &Path,
        output: &Path,
        spans: &[TimeSpan],
        with_audio: bool,
    ) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(input, output)
            .filter_complex(keep_spans_filter(spans, with_audio))
            .map(KEEP_VIDEO_LABEL);
        if with_audio {
            cmd = cmd.map(KEEP_AUDIO_LABEL);
        }
        self.encode(cmd)
    }

    fn silence_detect_command(&self, input: &Path) -> FfmpegCommand {
        FfmpegCommand::analysis(input)
            .audio_filter(silence_detect_filter(
                self.config.silence.noise_db,
                self.config.silence.min_silence_ms,
            ))
            .output_args(["-vn", "-f", "null"])
    }

    async fn probe(&self, input: &Path) -> MediaResult<VideoInfo> {
        probe_video(input).await
    }

    async fn render_keep_spans(
        &self,
        input: &Path,
        output: &Path,
        spans: &[TimeSpan],
        with_audio: bool,
    ) -> MediaResult<()> {
        if spans.is_empty() {
            return Err(MediaError::invalid_input("nothing left to keep"));
        }
        let cmd = self.keep_spans_command(input, output, spans, with_audio);
        self.runner.run("keep_spans", &cmd).await
    }
}

async fn copy_through(input: &Path, output: &Path) -> MediaResult<()> {
    tokio::fs::copy(input, output).await?;
    Ok(())
}

/// Best-effort removal of a sidecar file.
async fn remove_sidecar(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Failed to remove sidecar file: {}", e);
        }
    }
}

fn sidecar_path(output: &Path, extension: &str) -> PathBuf {
    let mut name = output
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{extension}"));
    output.with_file_name(name)
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn trim_silence(&self, input: &Path, output: &Path) -> MediaResult<TrimOutcome> {
        let info = self.probe(input).await?;

        if !info.has_audio {
            debug!(path = %input.display(), "No audio stream, skipping silence trim");
            copy_through(input, output).await?;
            return Ok(TrimOutcome {
                applied: false,
                duration_secs: info.duration,
                removed_secs: 0.0,
            });
        }

        let log = self
            .runner
            .run_capture("silence_detect", &self.silence_detect_command(input))
            .await?;
        let plan = plan_trim(&log, info.duration, &self.config.silence);

        if !plan.apply {
            copy_through(input, output).await?;
            return Ok(TrimOutcome {
                applied: false,
                duration_secs: info.duration,
                removed_secs: 0.0,
            });
        }

        let stats = plan.stats();
        self.render_keep_spans(input, output, &plan.keep_spans(), true)
            .await?;

        let outcome = TrimOutcome {
            applied: true,
            duration_secs: stats.total_keep_ms as f64 / 1000.0,
            removed_secs: stats.total_cut_ms as f64 / 1000.0,
        };
        info!(
            cuts = stats.cut_count,
            removed_secs = outcome.removed_secs,
            duration_secs = outcome.duration_secs,
            "Silence trimmed"
        );
        Ok(outcome)
    }

    async fn normalize_audio(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let info = self.probe(input).await?;
        if !info.has_audio {
            return copy_through(input, output).await;
        }

        let cmd = FfmpegCommand::new(input, output)
            .audio_filter(FILTER_LOUDNORM)
            .video_codec("copy")
            .audio_codec("aac")
            .audio_bitrate(self.config.audio_bitrate.clone())
            .faststart();
        self.runner.run("normalize_audio", &cmd).await
    }

    async fn cut_spans(&self, input: &Path, output: &Path, cuts: &[TimeSpan]) -> MediaResult<()> {
        let info = self.probe(input).await?;
        let keeps = keep_spans(cuts, info.duration);
        self.render_keep_spans(input, output, &keeps, info.has_audio)
            .await
    }

    async fn burn_captions(
        &self,
        input: &Path,
        output: &Path,
        transcript: &Transcript,
    ) -> MediaResult<()> {
        let cues = build_cues(transcript);
        if cues.is_empty() {
            warn!(path = %input.display(), "Transcript has no caption cues, copying input");
            return copy_through(input, output).await;
        }

        let srt_path = sidecar_path(output, "srt");
        tokio::fs::write(&srt_path, to_srt(&cues)).await?;

        let cmd = self.encode(
            FfmpegCommand::new(input, output).video_filter(subtitles_filter(&srt_path)),
        );
        let result = self.runner.run("burn_captions", &cmd).await;
        remove_sidecar(&srt_path).await;
        result
    }

    async fn overlay_headline(&self, input: &Path, output: &Path, text: &str) -> MediaResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MediaError::invalid_input("headline text is empty"));
        }

        // drawtext reads the text verbatim from a file, avoiding filter escaping
        let text_path = sidecar_path(output, "headline.txt");
        tokio::fs::write(&text_path, text).await?;

        let filter = headline_filter(&text_path, self.config.font_file.as_deref());
        let cmd = self.encode(FfmpegCommand::new(input, output).video_filter(filter));
        let result = self.runner.run("overlay_headline", &cmd).await;
        remove_sidecar(&text_path).await;
        result
    }

    async fn convert_aspect(
        &self,
        input: &Path,
        output: &Path,
        ratio: AspectRatio,
    ) -> MediaResult<()> {
        if !ratio.is_valid() {
            return Err(MediaError::invalid_input(format!("invalid aspect ratio {ratio}")));
        }

        let info = self.probe(input).await?;
        if cover_crop_dims(info.width, info.height, ratio) == (info.width, info.height) {
            debug!(%ratio, "Input already matches target aspect ratio");
            return copy_through(input, output).await;
        }

        let cmd = self.encode(
            FfmpegCommand::new(input, output)
                .video_filter(aspect_crop_filter(info.width, info.height, ratio)),
        );
        self.runner.run("convert_aspect", &cmd).await
    }

    async fn duration(&self, input: &Path) -> MediaResult<f64> {
        Ok(self.probe(input).await?.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_spans_command_maps_labels() {
        let engine = FfmpegEngine::default();
        let args = engine
            .keep_spans_command(
                Path::new("in.mp4"),
                Path::new("out.mp4"),
                &[TimeSpan::new(0.0, 3.2), TimeSpan::new(4.8, 10.0)],
                true,
            )
            .build_args();

        assert!(args.windows(2).any(|w| w == ["-map", "[outv]"]));
        assert!(args.windows(2).any(|w| w == ["-map", "[outa]"]));
        assert!(args.windows(2).any(|w| w == ["-preset", "veryfast"]));
        assert!(args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
    }

    #[test]
    fn test_silence_detect_command_discards_output() {
        let engine = FfmpegEngine::default();
        let args = engine.silence_detect_command(Path::new("in.mp4")).build_args();
        assert!(args.windows(2).any(|w| w == ["-af", "silencedetect=noise=-35dB:d=1.000"]));
        assert!(args.windows(2).any(|w| w == ["-f", "null"]));
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/work/job/step-3.mp4"), "srt"),
            PathBuf::from("/work/job/step-3.srt")
        );
    }

    #[tokio::test]
    async fn test_overlay_rejects_blank_text() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FfmpegEngine::default();
        let err = engine
            .overlay_headline(&dir.path().join("in.mp4"), &dir.path().join("out.mp4"), "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidInput(_)));
    }
}
