// ── Session-wide singletons ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::output::{RecordStatus, ReplayBufferStatus, StreamStatus};

/// Version and capability info reported by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub app_version: Option<String>,
    pub protocol_version: Option<String>,
    pub rpc_version: Option<u32>,
    pub platform: Option<String>,
    pub platform_description: Option<String>,
    pub image_formats: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub base_width: u32,
    pub base_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub fps_numerator: u32,
    pub fps_denominator: u32,
}

impl VideoSettings {
    pub fn fps(&self) -> Option<f64> {
        (self.fps_denominator != 0)
            .then(|| f64::from(self.fps_numerator) / f64::from(self.fps_denominator))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub index: i64,
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// A list of names with at most one current entry (profiles, scene
/// collections).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedList {
    pub names: Vec<String>,
    pub current: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionState {
    pub current: Option<String>,
    pub duration_ms: Option<u64>,
    pub active: bool,
}

/// Downstream-keyer plugin state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DskState {
    pub tab_count: u32,
    /// Scene names per zero-based tab index. Only fetched tabs appear.
    pub items: BTreeMap<u32, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorEvent {
    pub vendor_name: String,
    pub event_type: String,
    pub event_data: Value,
}

/// Everything that is one-per-session rather than a keyed collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub remote: Option<RemoteInfo>,
    pub studio_mode: bool,
    pub program_scene: Option<String>,
    pub preview_scene: Option<String>,
    pub transition: TransitionState,
    pub current_media: Option<String>,
    pub profiles: NamedList,
    pub scene_collections: NamedList,
    /// A scene-collection switch is in progress.
    pub collection_changing: bool,
    pub video: Option<VideoSettings>,
    pub hotkeys: Vec<String>,
    pub monitors: Vec<Monitor>,
    pub stream: StreamStatus,
    pub record: RecordStatus,
    pub replay_buffer: ReplayBufferStatus,
    pub virtual_cam_active: bool,
    pub dsk: DskState,
    pub last_vendor_event: Option<VendorEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub cpu_usage: f64,
    pub memory_usage_mb: f64,
    pub available_disk_space_mb: f64,
    pub active_fps: f64,
    pub average_frame_render_time_ms: f64,
    pub render_skipped_frames: u64,
    pub render_total_frames: u64,
    pub output_skipped_frames: u64,
    pub output_total_frames: u64,
}

/// High-frequency readings, kept apart from [`SessionState`] so meter
/// updates never wake structural subscribers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    pub stats: Option<PerformanceStats>,
    /// Peak level in dBFS of the first channel, per input. Silent inputs
    /// are absent.
    pub peaks: BTreeMap<String, f64>,
}
