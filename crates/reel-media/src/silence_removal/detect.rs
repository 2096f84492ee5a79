//! Parser for FFmpeg `silencedetect` log output.

use std::sync::LazyLock;

use regex::Regex;

/// A detected silent interval in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilenceInterval {
    pub start_ms: u64,
    pub end_ms: u64,
}

static START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"silence_start:\s*(-?[0-9.]+)").expect("valid silence_start regex"));
static END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"silence_end:\s*(-?[0-9.]+)").expect("valid silence_end regex"));

fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

/// Extract silent intervals from the filter log.
///
/// A trailing `silence_start` with no matching end runs to `total_ms`.
pub fn parse_silence_log(log: &str, total_ms: u64) -> Vec<SilenceInterval> {
    let mut intervals = Vec::new();
    let mut open: Option<u64> = None;

    for line in log.lines() {
        if let Some(caps) = START_RE.captures(line) {
            if let Ok(secs) = caps[1].parse::<f64>() {
                open = Some(secs_to_ms(secs));
            }
        } else if let Some(caps) = END_RE.captures(line) {
            if let (Some(start_ms), Ok(secs)) = (open.take(), caps[1].parse::<f64>()) {
                let end_ms = secs_to_ms(secs).min(total_ms);
                if end_ms > start_ms {
                    intervals.push(SilenceInterval { start_ms, end_ms });
                }
            }
        }
    }

    if let Some(start_ms) = open {
        if total_ms > start_ms {
            intervals.push(SilenceInterval {
                start_ms,
                end_ms: total_ms,
            });
        }
    }

    intervals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let log = "\
[silencedetect @ 0x55d] silence_start: 3
[silencedetect @ 0x55d] silence_end: 5 | silence_duration: 2
size=N/A time=00:00:10.00 bitrate=N/A speed= 250x
";
        assert_eq!(
            parse_silence_log(log, 10_000),
            vec![SilenceInterval {
                start_ms: 3000,
                end_ms: 5000
            }]
        );
    }

    #[test]
    fn test_trailing_silence_runs_to_end() {
        let log = "\
[silencedetect @ 0x1] silence_start: -0.002
[silencedetect @ 0x1] silence_end: 1.5 | silence_duration: 1.502
[silencedetect @ 0x1] silence_start: 8.25
";
        let intervals = parse_silence_log(log, 10_000);
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].start_ms, 0);
        assert_eq!(
            intervals[1],
            SilenceInterval {
                start_ms: 8250,
                end_ms: 10_000
            }
        );
    }

    #[test]
    fn test_no_silence() {
        assert!(parse_silence_log("frame=10\n", 5_000).is_empty());
    }
}
