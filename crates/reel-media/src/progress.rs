//! FFmpeg progress snapshots.

use serde::{Deserialize, Serialize};

/// Progress block emitted by `-progress pipe:2`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (1.5 = 1.5x realtime)
    pub speed: f64,
    /// Set on the final block
    pub is_complete: bool,
}
