// Typed `responseData` payloads for the requests the state mirror issues.
//
// Field names follow the remote's camelCase. Everything the remote may
// omit is defaulted so a sparse response still decodes.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

// ── Scenes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneList {
    #[serde(default)]
    pub current_program_scene_name: Option<String>,
    #[serde(default)]
    pub current_preview_scene_name: Option<String>,
    #[serde(default)]
    pub scenes: Vec<SceneEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneEntry {
    pub scene_name: String,
    #[serde(default)]
    pub scene_index: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItemList {
    #[serde(default)]
    pub scene_items: Vec<SceneItemEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItemEntry {
    pub scene_item_id: i64,
    #[serde(default)]
    pub scene_item_index: i64,
    #[serde(default)]
    pub scene_item_enabled: bool,
    pub source_name: String,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub input_kind: Option<String>,
    #[serde(default)]
    pub is_group: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPreviewScene {
    #[serde(default)]
    pub scene_name: Option<String>,
}

// ── Sources / inputs ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceActive {
    #[serde(default)]
    pub video_active: bool,
    #[serde(default)]
    pub video_showing: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSettings {
    #[serde(default)]
    pub input_kind: Option<String>,
    #[serde(default)]
    pub input_settings: Value,
}

/// `GetSpecialInputs`: fixed slots (`desktop1`, `mic1`, ...) mapped to
/// an input name or `null`.
pub type SpecialInputs = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterList {
    #[serde(default)]
    pub filters: Vec<FilterEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterEntry {
    pub filter_name: String,
    #[serde(default)]
    pub filter_kind: String,
    #[serde(default)]
    pub filter_index: i64,
    #[serde(default)]
    pub filter_enabled: bool,
}

// ── Audio ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAudioTracks {
    #[serde(default)]
    pub input_audio_tracks: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMute {
    pub input_muted: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputVolume {
    #[serde(default)]
    pub input_volume_db: f64,
    #[serde(default)]
    pub input_volume_mul: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAudioBalance {
    pub input_audio_balance: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAudioSyncOffset {
    pub input_audio_sync_offset: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAudioMonitorType {
    pub monitor_type: String,
}

// ── Transitions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionList {
    #[serde(default)]
    pub current_scene_transition_name: Option<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEntry {
    pub transition_name: String,
    #[serde(default)]
    pub transition_kind: String,
    #[serde(default)]
    pub transition_fixed: bool,
    #[serde(default)]
    pub transition_configurable: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentTransition {
    #[serde(default)]
    pub transition_name: Option<String>,
    #[serde(default)]
    pub transition_duration: Option<u64>,
}

// ── Profiles / collections ───────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileList {
    #[serde(default)]
    pub current_profile_name: Option<String>,
    #[serde(default)]
    pub profiles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneCollectionList {
    #[serde(default)]
    pub current_scene_collection_name: Option<String>,
    #[serde(default)]
    pub scene_collections: Vec<String>,
}

// ── General ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    #[serde(default, alias = "cre8Version")]
    pub obs_version: Option<String>,
    #[serde(default, alias = "cre8WebSocketVersion")]
    pub obs_web_socket_version: Option<String>,
    #[serde(default)]
    pub rpc_version: Option<u32>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub platform_description: Option<String>,
    #[serde(default)]
    pub supported_image_formats: Vec<String>,
    #[serde(default)]
    pub available_requests: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioModeEnabled {
    pub studio_mode_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HotkeyList {
    #[serde(default)]
    pub hotkeys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorList {
    #[serde(default)]
    pub monitors: Vec<MonitorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEntry {
    pub monitor_index: i64,
    #[serde(default)]
    pub monitor_name: Option<String>,
    #[serde(default)]
    pub monitor_width: u32,
    #[serde(default)]
    pub monitor_height: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSettings {
    pub base_width: u32,
    pub base_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub fps_numerator: u32,
    pub fps_denominator: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
    #[serde(default)]
    pub available_disk_space: f64,
    #[serde(default)]
    pub active_fps: f64,
    #[serde(default)]
    pub average_frame_render_time: f64,
    #[serde(default)]
    pub render_skipped_frames: u64,
    #[serde(default)]
    pub render_total_frames: u64,
    #[serde(default)]
    pub output_skipped_frames: u64,
    #[serde(default)]
    pub output_total_frames: u64,
}

// ── Outputs ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct OutputList {
    #[serde(default)]
    pub outputs: Vec<OutputEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEntry {
    pub output_name: String,
    #[serde(default)]
    pub output_kind: String,
    #[serde(default)]
    pub output_active: bool,
}

/// Shared shape of `GetOutputStatus`, `GetStreamStatus` and
/// `GetRecordStatus`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputStatus {
    #[serde(default)]
    pub output_active: bool,
    #[serde(default)]
    pub output_paused: bool,
    #[serde(default)]
    pub output_reconnecting: bool,
    #[serde(default)]
    pub output_timecode: Option<String>,
    #[serde(default)]
    pub output_duration: Option<u64>,
    #[serde(default)]
    pub output_congestion: Option<f64>,
    #[serde(default)]
    pub output_bytes: u64,
    #[serde(default)]
    pub output_skipped_frames: u64,
    #[serde(default)]
    pub output_total_frames: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamServiceSettings {
    #[serde(default)]
    pub stream_service_type: Option<String>,
    #[serde(default)]
    pub stream_service_settings: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDirectory {
    pub record_directory: String,
}

// ── Media ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInputStatus {
    #[serde(default)]
    pub media_state: String,
    #[serde(default)]
    pub media_duration: Option<i64>,
    #[serde(default)]
    pub media_cursor: Option<i64>,
}

// ── Vendor requests ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorResponse {
    #[serde(default)]
    pub vendor_name: String,
    #[serde(default)]
    pub request_type: String,
    #[serde(default)]
    pub response_data: Value,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_accepts_either_vendor_field_name() {
        let obs: Version = serde_json::from_value(json!({
            "obsVersion": "30.1.0",
            "supportedImageFormats": ["png", "jpg"]
        }))
        .unwrap();
        assert_eq!(obs.obs_version.as_deref(), Some("30.1.0"));

        let cre8: Version = serde_json::from_value(json!({ "cre8Version": "2.0.4" })).unwrap();
        assert_eq!(cre8.obs_version.as_deref(), Some("2.0.4"));
        assert!(cre8.supported_image_formats.is_empty());
    }

    #[test]
    fn sparse_scene_item_decodes() {
        let list: SceneItemList = serde_json::from_value(json!({
            "sceneItems": [{ "sceneItemId": 3, "sourceName": "Camera" }]
        }))
        .unwrap();
        let item = &list.scene_items[0];
        assert_eq!(item.scene_item_id, 3);
        assert!(item.input_kind.is_none());
        assert!(!item.scene_item_enabled);
    }

    #[test]
    fn special_inputs_keep_empty_slots() {
        let special: SpecialInputs = serde_json::from_value(json!({
            "desktop1": "Desktop Audio",
            "desktop2": null,
            "mic1": "Mic/Aux"
        }))
        .unwrap();
        let names: Vec<&str> = special.values().flatten().map(String::as_str).collect();
        assert_eq!(names, ["Desktop Audio", "Mic/Aux"]);
    }
}
