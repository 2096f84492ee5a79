//! FFmpeg filter graph builders.

use std::path::Path;

use reel_models::{AspectRatio, TimeSpan};

/// EBU R128 loudness target used for short-form delivery.
pub const FILTER_LOUDNORM: &str = "loudnorm=I=-16:TP=-1.5:LRA=11";

/// Output labels produced by [`keep_spans_filter`].
pub const KEEP_VIDEO_LABEL: &str = "[outv]";
pub const KEEP_AUDIO_LABEL: &str = "[outa]";

/// Filter graph that keeps only `spans` of the input and re-times the result.
///
/// Produces `[outv]` and, when `with_audio` is set, `[outa]`.
pub fn keep_spans_filter(spans: &[TimeSpan], with_audio: bool) -> String {
    let expr = spans
        .iter()
        .map(|s| format!("between(t,{:.3},{:.3})", s.start, s.end))
        .collect::<Vec<_>>()
        .join("+");

    let mut graph = format!("[0:v]select='{}',setpts=N/FRAME_RATE/TB{}", expr, KEEP_VIDEO_LABEL);
    if with_audio {
        graph.push_str(&format!(
            ";[0:a]aselect='{}',asetpts=N/SR/TB{}",
            expr, KEEP_AUDIO_LABEL
        ));
    }
    graph
}

/// `silencedetect` analysis filter.
pub fn silence_detect_filter(noise_db: f64, min_silence_ms: u64) -> String {
    format!(
        "silencedetect=noise={}dB:d={:.3}",
        noise_db,
        min_silence_ms as f64 / 1000.0
    )
}

/// Largest even-sized `ratio` rectangle that fits inside `width`x`height`.
pub fn cover_crop_dims(width: u32, height: u32, ratio: AspectRatio) -> (u32, u32) {
    let target = ratio.as_f64();
    let source = width as f64 / height.max(1) as f64;

    let (w, h) = if source > target {
        ((height as f64 * target).round() as u32, height)
    } else {
        (width, (width as f64 / target).round() as u32)
    };

    (even(w.min(width)), even(h.min(height)))
}

fn even(v: u32) -> u32 {
    (v - v % 2).max(2)
}

/// Center crop to the target ratio.
pub fn aspect_crop_filter(width: u32, height: u32, ratio: AspectRatio) -> String {
    let (w, h) = cover_crop_dims(width, height, ratio);
    format!("crop={w}:{h}:(iw-{w})/2:(ih-{h})/2,setsar=1")
}

/// `drawtext` overlay reading its text from a file, centered in the upper third.
pub fn headline_filter(text_file: &Path, font_file: Option<&Path>) -> String {
    let mut filter = format!("drawtext=textfile='{}'", escape_filter_path(text_file));
    if let Some(font) = font_file {
        filter.push_str(&format!(":fontfile='{}'", escape_filter_path(font)));
    }
    filter.push_str(
        ":fontsize=h/18:fontcolor=white:box=1:boxcolor=black@0.55:boxborderw=24\
         :x=(w-text_w)/2:y=h/6",
    );
    filter
}

/// `subtitles` filter for burning an SRT file.
pub fn subtitles_filter(srt_file: &Path) -> String {
    format!(
        "subtitles='{}':force_style='FontSize=16,Outline=2,MarginV=60'",
        escape_filter_path(srt_file)
    )
}

/// Escape a path for use inside a single-quoted filter option.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "'\\''")
}
