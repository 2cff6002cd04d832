// ── Wire-to-domain conversions ──
//
// Bridges `scenesync_api::responses` payloads into the canonical
// `scenesync_core::model` types.

use scenesync_api::responses;

use crate::model::{
    Filter, MediaState, MediaStatus, Monitor, Output, PerformanceStats, RemoteInfo, Scene,
    SceneItem, Source, SourceKind, Transition, VideoSettings,
};

// ── Scenes ─────────────────────────────────────────────────────────

impl From<responses::SceneEntry> for Scene {
    fn from(entry: responses::SceneEntry) -> Self {
        Self {
            name: entry.scene_name,
            index: entry.scene_index,
        }
    }
}

impl From<responses::SceneItemEntry> for SceneItem {
    fn from(entry: responses::SceneItemEntry) -> Self {
        Self {
            id: entry.scene_item_id,
            index: entry.scene_item_index,
            enabled: entry.scene_item_enabled,
            source_name: entry.source_name,
            source_type: entry.source_type,
            input_kind: entry.input_kind,
            is_group: entry.is_group.unwrap_or(false),
        }
    }
}

/// The source a scene item places, as first discovered.
pub(crate) fn source_from_item(item: &SceneItem, group: Option<&str>) -> Source {
    let mut source = Source::new(
        item.source_name.clone(),
        SourceKind::classify(
            item.input_kind.as_deref(),
            item.source_type.as_deref(),
            item.is_group,
        ),
    );
    source.input_kind.clone_from(&item.input_kind);
    source.source_type.clone_from(&item.source_type);
    source.group = group.map(str::to_owned);
    source
}

// ── Sources ────────────────────────────────────────────────────────

impl From<responses::FilterEntry> for Filter {
    fn from(entry: responses::FilterEntry) -> Self {
        Self {
            name: entry.filter_name,
            kind: entry.filter_kind,
            index: entry.filter_index,
            enabled: entry.filter_enabled,
        }
    }
}

pub(crate) fn filters(list: responses::FilterList) -> Vec<Filter> {
    let mut filters: Vec<Filter> = list.filters.into_iter().map(Filter::from).collect();
    filters.sort_by_key(|f| f.index);
    filters
}

pub(crate) fn media_status(input_name: &str, status: responses::MediaInputStatus) -> MediaStatus {
    MediaStatus {
        input_name: input_name.to_owned(),
        state: MediaState::from_wire(&status.media_state),
        cursor_ms: status.media_cursor,
        duration_ms: status.media_duration,
    }
}

impl From<responses::TransitionEntry> for Transition {
    fn from(entry: responses::TransitionEntry) -> Self {
        Self {
            name: entry.transition_name,
            kind: entry.transition_kind,
            fixed: entry.transition_fixed,
            configurable: entry.transition_configurable,
        }
    }
}

// ── General ────────────────────────────────────────────────────────

impl From<responses::Version> for RemoteInfo {
    fn from(v: responses::Version) -> Self {
        Self {
            app_version: v.obs_version,
            protocol_version: v.obs_web_socket_version,
            rpc_version: v.rpc_version,
            platform: v.platform,
            platform_description: v.platform_description,
            image_formats: v.supported_image_formats,
        }
    }
}

impl From<responses::MonitorEntry> for Monitor {
    fn from(m: responses::MonitorEntry) -> Self {
        Self {
            index: m.monitor_index,
            name: m.monitor_name,
            width: m.monitor_width,
            height: m.monitor_height,
        }
    }
}

impl From<responses::VideoSettings> for VideoSettings {
    fn from(v: responses::VideoSettings) -> Self {
        Self {
            base_width: v.base_width,
            base_height: v.base_height,
            output_width: v.output_width,
            output_height: v.output_height,
            fps_numerator: v.fps_numerator,
            fps_denominator: v.fps_denominator,
        }
    }
}

impl From<responses::Stats> for PerformanceStats {
    fn from(s: responses::Stats) -> Self {
        Self {
            cpu_usage: s.cpu_usage,
            memory_usage_mb: s.memory_usage,
            available_disk_space_mb: s.available_disk_space,
            active_fps: s.active_fps,
            average_frame_render_time_ms: s.average_frame_render_time,
            render_skipped_frames: s.render_skipped_frames,
            render_total_frames: s.render_total_frames,
            output_skipped_frames: s.output_skipped_frames,
            output_total_frames: s.output_total_frames,
        }
    }
}

// ── Outputs ────────────────────────────────────────────────────────

pub(crate) fn output(entry: &responses::OutputEntry, status: &responses::OutputStatus) -> Output {
    Output {
        name: entry.output_name.clone(),
        kind: entry.output_kind.clone(),
        active: status.output_active,
        reconnecting: status.output_reconnecting,
        timecode: status.output_timecode.as_deref().map(short_timecode),
        bytes: status.output_bytes,
        congestion: status.output_congestion,
        skipped_frames: status.output_skipped_frames,
        total_frames: status.output_total_frames,
    }
}

/// `HH:MM:SS.mmm` → `HH:MM:SS`.
pub(crate) fn short_timecode(raw: &str) -> String {
    raw.split('.').next().unwrap_or(raw).to_owned()
}
