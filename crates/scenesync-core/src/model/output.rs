// ── Output domain types ──

use serde::{Deserialize, Serialize};
use strum::Display;

/// Output kind of the virtual camera, the only output whose state also
/// arrives through a dedicated event.
pub const VIRTUALCAM_OUTPUT: &str = "virtualcam_output";

/// A generic output as reported by `GetOutputList` / `GetOutputStatus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    pub kind: String,
    pub active: bool,
    pub reconnecting: bool,
    pub timecode: Option<String>,
    pub bytes: u64,
    pub congestion: Option<f64>,
    pub skipped_frames: u64,
    pub total_frames: u64,
}

impl Output {
    /// Streaming, recording and replay outputs have dedicated singletons
    /// and are not offered as generic outputs.
    pub fn is_generic(&self) -> bool {
        !matches!(
            self.kind.as_str(),
            "ffmpeg_muxer" | "ffmpeg_output" | "replay_buffer" | "rtmp_output"
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub active: bool,
    pub reconnecting: bool,
    pub timecode: Option<String>,
    pub bytes: u64,
    pub congestion: Option<f64>,
    pub skipped_frames: u64,
    pub total_frames: u64,
    /// Throughput over the last stats interval.
    pub kbits_per_sec: u64,
    /// Streaming service name, `None` for custom servers.
    pub service: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    #[default]
    Stopped,
    Recording,
    Paused,
}

impl RecordState {
    pub fn from_flags(active: bool, paused: bool) -> Self {
        match (active, paused) {
            (_, true) => Self::Paused,
            (true, false) => Self::Recording,
            (false, false) => Self::Stopped,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatus {
    pub state: RecordState,
    pub timecode: Option<String>,
    pub bytes: u64,
    pub directory: Option<String>,
    /// Path of the file most recently written.
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayBufferStatus {
    pub active: bool,
    pub last_saved_path: Option<String>,
}
