// ── Typed push events ──
//
// The closed set of remote events the mirror understands. Raw frames are
// decoded here once; the reconciler matches on the result exhaustively.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Value, json};
use strum::{AsRefStr, EnumDiscriminants, EnumString};

use scenesync_api::RawEvent;
use scenesync_api::responses::{FilterEntry, SceneEntry};

/// How an event relates to the scene-collection switch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    /// Touches per-collection state; dropped while a switch is running.
    Collection,
    /// Session-wide; always applied.
    Global,
    /// Carries nothing the mirror tracks.
    Inert,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterReading {
    pub input_name: String,
    /// Per channel: `[magnitude, peak, input_peak]`, linear.
    #[serde(default)]
    pub input_levels_mul: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPosition {
    pub scene_item_id: i64,
    pub scene_item_index: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, EnumDiscriminants)]
#[strum_discriminants(name(EventKind), derive(EnumString, AsRefStr, Hash))]
#[serde(
    tag = "eventType",
    content = "eventData",
    rename_all_fields = "camelCase"
)]
pub enum Event {
    // ── General ──
    ExitStarted {},
    VendorEvent {
        vendor_name: String,
        event_type: String,
        #[serde(default)]
        event_data: Value,
    },

    // ── Config ──
    CurrentSceneCollectionChanging {
        #[serde(default)]
        scene_collection_name: Option<String>,
    },
    CurrentSceneCollectionChanged {
        scene_collection_name: String,
    },
    SceneCollectionListChanged {
        scene_collections: Vec<String>,
    },
    CurrentProfileChanging {},
    CurrentProfileChanged {
        profile_name: String,
    },
    ProfileListChanged {
        profiles: Vec<String>,
    },

    // ── Scenes ──
    SceneCreated {
        scene_name: String,
        #[serde(default)]
        is_group: bool,
    },
    SceneRemoved {
        scene_name: String,
        #[serde(default)]
        is_group: bool,
    },
    SceneNameChanged {
        old_scene_name: String,
        scene_name: String,
    },
    CurrentProgramSceneChanged {
        scene_name: String,
    },
    CurrentPreviewSceneChanged {
        scene_name: String,
    },
    SceneListChanged {
        scenes: Vec<SceneEntry>,
    },

    // ── Inputs ──
    InputCreated {
        input_name: String,
    },
    InputRemoved {
        input_name: String,
    },
    InputNameChanged {
        old_input_name: String,
        input_name: String,
    },
    InputActiveStateChanged {
        input_name: String,
        video_active: bool,
    },
    InputShowStateChanged {
        input_name: String,
        video_showing: bool,
    },
    InputMuteStateChanged {
        input_name: String,
        input_muted: bool,
    },
    InputVolumeChanged {
        input_name: String,
        input_volume_db: f64,
        #[serde(default)]
        input_volume_mul: f64,
    },
    InputAudioBalanceChanged {
        input_name: String,
        input_audio_balance: f64,
    },
    InputAudioSyncOffsetChanged {
        input_name: String,
        input_audio_sync_offset: i64,
    },
    InputAudioMonitorTypeChanged {
        input_name: String,
        monitor_type: String,
    },
    InputAudioTracksChanged {
        input_name: String,
        input_audio_tracks: BTreeMap<String, bool>,
    },
    InputVolumeMeters {
        inputs: Vec<MeterReading>,
    },
    InputSettingsChanged {
        input_name: String,
        input_settings: Value,
    },

    // ── Transitions ──
    CurrentSceneTransitionChanged {
        transition_name: String,
    },
    CurrentSceneTransitionDurationChanged {
        transition_duration: u64,
    },
    SceneTransitionStarted {},
    SceneTransitionEnded {},
    SceneTransitionVideoEnded {},

    // ── Filters ──
    SourceFilterCreated {
        source_name: String,
        filter_name: String,
    },
    SourceFilterRemoved {
        source_name: String,
        filter_name: String,
    },
    SourceFilterNameChanged {
        source_name: String,
        old_filter_name: String,
        filter_name: String,
    },
    SourceFilterEnableStateChanged {
        source_name: String,
        filter_name: String,
        filter_enabled: bool,
    },
    SourceFilterListReindexed {
        source_name: String,
        filters: Vec<FilterEntry>,
    },

    // ── Scene items ──
    SceneItemCreated {
        scene_name: String,
    },
    SceneItemRemoved {
        scene_name: String,
        scene_item_id: i64,
    },
    SceneItemListReindexed {
        scene_name: String,
        scene_items: Vec<ItemPosition>,
    },
    SceneItemEnableStateChanged {
        scene_name: String,
        scene_item_id: i64,
        scene_item_enabled: bool,
    },
    SceneItemLockStateChanged {},
    SceneItemSelected {},
    SceneItemTransformChanged {},

    // ── Outputs ──
    StreamStateChanged {
        output_active: bool,
        #[serde(default)]
        output_state: String,
    },
    RecordStateChanged {
        output_active: bool,
        #[serde(default)]
        output_state: String,
        #[serde(default)]
        output_path: Option<String>,
    },
    ReplayBufferStateChanged {
        output_active: bool,
        #[serde(default)]
        output_state: String,
    },
    VirtualcamStateChanged {
        output_active: bool,
        #[serde(default)]
        output_state: String,
    },
    ReplayBufferSaved {
        saved_replay_path: String,
    },

    // ── Media inputs ──
    MediaInputPlaybackStarted {
        input_name: String,
    },
    MediaInputPlaybackEnded {
        input_name: String,
    },
    MediaInputActionTriggered {
        input_name: String,
        media_action: String,
    },

    // ── UI ──
    StudioModeStateChanged {
        studio_mode_enabled: bool,
    },

    // ── Not decoded ──
    #[serde(skip)]
    Unrecognized { event_type: String },
    #[serde(skip)]
    Malformed { event_type: String, reason: String },
}

impl Event {
    /// Decode a raw push event. Never fails: unknown types become
    /// [`Event::Unrecognized`], bad payloads [`Event::Malformed`].
    pub fn parse(raw: &RawEvent) -> Self {
        let known = EventKind::from_str(&raw.event_type)
            .is_ok_and(|k| !matches!(k, EventKind::Unrecognized | EventKind::Malformed));
        if !known {
            return Self::Unrecognized {
                event_type: raw.event_type.clone(),
            };
        }

        let data = raw.event_data.clone().unwrap_or_else(|| json!({}));
        let tagged = json!({ "eventType": raw.event_type, "eventData": data });
        serde_json::from_value(tagged).unwrap_or_else(|e| Self::Malformed {
            event_type: raw.event_type.clone(),
            reason: e.to_string(),
        })
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from(self)
    }

    pub fn scope(&self) -> EventScope {
        match self {
            Self::ExitStarted {}
            | Self::VendorEvent { .. }
            | Self::CurrentSceneCollectionChanging { .. }
            | Self::CurrentSceneCollectionChanged { .. }
            | Self::SceneCollectionListChanged { .. }
            | Self::CurrentProfileChanged { .. }
            | Self::ProfileListChanged { .. }
            | Self::CurrentSceneTransitionChanged { .. }
            | Self::CurrentSceneTransitionDurationChanged { .. }
            | Self::SceneTransitionStarted {}
            | Self::SceneTransitionEnded {}
            | Self::StreamStateChanged { .. }
            | Self::RecordStateChanged { .. }
            | Self::ReplayBufferStateChanged { .. }
            | Self::VirtualcamStateChanged { .. }
            | Self::ReplayBufferSaved { .. }
            | Self::StudioModeStateChanged { .. } => EventScope::Global,

            Self::SceneCreated { .. }
            | Self::SceneRemoved { .. }
            | Self::SceneNameChanged { .. }
            | Self::CurrentProgramSceneChanged { .. }
            | Self::CurrentPreviewSceneChanged { .. }
            | Self::SceneListChanged { .. }
            | Self::InputRemoved { .. }
            | Self::InputNameChanged { .. }
            | Self::InputActiveStateChanged { .. }
            | Self::InputShowStateChanged { .. }
            | Self::InputMuteStateChanged { .. }
            | Self::InputVolumeChanged { .. }
            | Self::InputAudioBalanceChanged { .. }
            | Self::InputAudioSyncOffsetChanged { .. }
            | Self::InputAudioMonitorTypeChanged { .. }
            | Self::InputAudioTracksChanged { .. }
            | Self::InputVolumeMeters { .. }
            | Self::InputSettingsChanged { .. }
            | Self::SourceFilterCreated { .. }
            | Self::SourceFilterRemoved { .. }
            | Self::SourceFilterNameChanged { .. }
            | Self::SourceFilterEnableStateChanged { .. }
            | Self::SourceFilterListReindexed { .. }
            | Self::SceneItemCreated { .. }
            | Self::SceneItemRemoved { .. }
            | Self::SceneItemListReindexed { .. }
            | Self::SceneItemEnableStateChanged { .. }
            | Self::MediaInputPlaybackStarted { .. }
            | Self::MediaInputPlaybackEnded { .. }
            | Self::MediaInputActionTriggered { .. } => EventScope::Collection,

            Self::CurrentProfileChanging {}
            | Self::InputCreated { .. }
            | Self::SceneTransitionVideoEnded {}
            | Self::SceneItemLockStateChanged {}
            | Self::SceneItemSelected {}
            | Self::SceneItemTransformChanged {}
            | Self::Unrecognized { .. }
            | Self::Malformed { .. } => EventScope::Inert,
        }
    }
}
