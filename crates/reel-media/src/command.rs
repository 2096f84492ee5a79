//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path (`-` with `-f null` for analysis passes)
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Analysis pass that decodes the input and discards the output.
    pub fn analysis(input: impl AsRef<Path>) -> Self {
        Self::new(input, "-").log_level("info")
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter label into the output.
    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Move the moov atom up front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-nostats".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands.
///
/// Children are spawned with `kill_on_drop`, so dropping a run future (a job
/// timeout or shutdown upstream) also kills the process. Progress blocks feed
/// the `ffmpeg_encode_speed` gauge and the completion log line.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the process after `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub async fn run(&self, operation: &str, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.execute(operation, cmd).await.map(|_| ())
    }

    /// Run and return every non-progress stderr line (for analysis filters).
    pub async fn run_capture(&self, operation: &str, cmd: &FfmpegCommand) -> MediaResult<String> {
        self.execute(operation, cmd).await
    }

    async fn execute(&self, operation: &str, cmd: &FfmpegCommand) -> MediaResult<String> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!(operation = %operation, "Running FFmpeg: ffmpeg {}", args.join(" "));

        let started = Instant::now();
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr was not captured"))?;
        let mut reader = BufReader::new(stderr).lines();

        let op = operation.to_string();
        let log_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut log = String::new();

            while let Ok(Some(line)) = reader.next_line().await {
                match parse_progress_line(&line, &mut current) {
                    LineKind::Progress(Some(snapshot)) => report_progress(&op, &snapshot),
                    LineKind::Progress(None) => {}
                    LineKind::Log => {
                        log.push_str(&line);
                        log.push('\n');
                    }
                }
            }
            log
        });

        let result = self.wait_for_exit(&mut child).await;
        let log = log_handle.await.unwrap_or_default();

        let status = if result.is_ok() { "ok" } else { "error" };
        counter!("ffmpeg_runs_total", "operation" => operation.to_string(), "status" => status)
            .increment(1);
        histogram!("ffmpeg_run_duration_seconds", "operation" => operation.to_string())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(Some(code)) if code != 0 => Err(MediaError::ffmpeg_failed(
                format!("{} exited with status {}", operation, code),
                Some(log),
                Some(code),
            )),
            Ok(None) => Err(MediaError::ffmpeg_failed(
                format!("{} terminated by signal", operation),
                Some(log),
                None,
            )),
            Ok(Some(_)) => Ok(log),
            Err(e) => Err(e),
        }
    }

    /// Wait for the child under the optional timeout; returns the exit code.
    async fn wait_for_exit(&self, child: &mut Child) -> MediaResult<Option<i32>> {
        let Some(secs) = self.timeout_secs else {
            return Ok(child.wait().await?.code());
        };

        match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
            Ok(status) => Ok(status?.code()),
            Err(_) => {
                warn!("FFmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                Err(MediaError::Timeout(secs))
            }
        }
    }
}

fn report_progress(operation: &str, snapshot: &FfmpegProgress) {
    gauge!("ffmpeg_encode_speed", "operation" => operation.to_string()).set(snapshot.speed);
    if snapshot.is_complete {
        debug!(
            operation,
            frames = snapshot.frame,
            out_secs = snapshot.out_time_ms as f64 / 1000.0,
            speed = snapshot.speed,
            "FFmpeg finished encoding"
        );
    }
}

enum LineKind {
    /// A `-progress` key; carries a snapshot when a block ends
    Progress(Option<FfmpegProgress>),
    /// Regular log output
    Log,
}

/// Parse a line from FFmpeg's stderr, folding `-progress` keys into `current`.
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> LineKind {
    let line = line.trim();

    let Some((key, value)) = line.split_once('=') else {
        return LineKind::Log;
    };

    match key {
        "out_time_us" | "out_time_ms" => {
            // Both keys carry microseconds in current FFmpeg builds
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return LineKind::Progress(Some(current.clone()));
        }
        "fps" | "bitrate" | "total_size" | "out_time" | "dup_frames" | "drop_frames"
        | "stream_0_0_q" => {}
        _ => return LineKind::Log,
    }

    LineKind::Progress(None)
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
