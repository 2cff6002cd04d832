//! Snapshot command: print one section of the mirrored state.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use scenesync_core::{
    ChoiceLists, Counters, Filter, MediaStatus, Output, Scene, SceneItem, SessionState, Source,
    Transition,
};

use crate::cli::{GlobalOpts, Section, SnapshotArgs};
use crate::error::CliError;
use crate::output::{self, check, or_dash};

use super::Remote;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct SceneRow {
    #[tabled(rename = "#")]
    index: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Live")]
    live: &'static str,
}

fn scene_row(scene: &Arc<Scene>, session: &SessionState) -> SceneRow {
    let name = Some(scene.name.as_str());
    let live = if session.program_scene.as_deref() == name {
        "program"
    } else if session.studio_mode && session.preview_scene.as_deref() == name {
        "preview"
    } else {
        ""
    };
    SceneRow {
        index: or_dash(scene.index),
        name: scene.name.clone(),
        live,
    }
}

/// A scene item with the scene it belongs to.
#[derive(Serialize)]
struct ItemLine<'a> {
    scene: &'a str,
    #[serde(flatten)]
    item: &'a SceneItem,
}

#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "Scene")]
    scene: String,
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Enabled")]
    enabled: &'static str,
}

impl From<&ItemLine<'_>> for ItemRow {
    fn from(line: &ItemLine<'_>) -> Self {
        let kind = if line.item.is_group {
            "group".to_owned()
        } else {
            line.item
                .input_kind
                .clone()
                .or_else(|| line.item.source_type.clone())
                .unwrap_or_default()
        };
        Self {
            scene: line.scene.to_owned(),
            id: line.item.id,
            source: line.item.source_name.clone(),
            kind,
            enabled: check(line.item.enabled),
        }
    }
}

#[derive(Tabled)]
struct SourceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Active")]
    active: &'static str,
    #[tabled(rename = "Showing")]
    showing: &'static str,
    #[tabled(rename = "Muted")]
    muted: String,
    #[tabled(rename = "Volume dB")]
    volume: String,
}

impl From<&Arc<Source>> for SourceRow {
    fn from(s: &Arc<Source>) -> Self {
        Self {
            name: s.name.clone(),
            kind: s.kind.to_string(),
            active: check(s.active),
            showing: check(s.video_showing),
            muted: s
                .audio
                .as_ref()
                .map(|a| check(a.muted).to_owned())
                .unwrap_or_default(),
            volume: s
                .audio
                .as_ref()
                .map(|a| format!("{:.1}", a.volume_db))
                .unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct FilterLine<'a> {
    source: &'a str,
    #[serde(flatten)]
    filter: &'a Filter,
}

#[derive(Tabled)]
struct FilterRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "#")]
    index: i64,
    #[tabled(rename = "Filter")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Enabled")]
    enabled: &'static str,
}

impl From<&FilterLine<'_>> for FilterRow {
    fn from(line: &FilterLine<'_>) -> Self {
        Self {
            source: line.source.to_owned(),
            index: line.filter.index,
            name: line.filter.name.clone(),
            kind: line.filter.kind.clone(),
            enabled: check(line.filter.enabled),
        }
    }
}

#[derive(Tabled)]
struct TransitionRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Fixed")]
    fixed: &'static str,
    #[tabled(rename = "Current")]
    current: &'static str,
}

#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Active")]
    active: &'static str,
    #[tabled(rename = "Timecode")]
    timecode: String,
    #[tabled(rename = "Skipped")]
    skipped: String,
}

impl From<&Arc<Output>> for OutputRow {
    fn from(o: &Arc<Output>) -> Self {
        Self {
            name: o.name.clone(),
            kind: o.kind.clone(),
            active: check(o.active),
            timecode: or_dash(o.timecode.as_deref()),
            skipped: format!("{}/{}", o.skipped_frames, o.total_frames),
        }
    }
}

#[derive(Tabled)]
struct MediaRow {
    #[tabled(rename = "Input")]
    input: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Position")]
    position: String,
    #[tabled(rename = "Remaining")]
    remaining: String,
}

impl From<&Arc<MediaStatus>> for MediaRow {
    fn from(m: &Arc<MediaStatus>) -> Self {
        Self {
            input: m.input_name.clone(),
            state: m.state.to_string(),
            position: format!(
                "{} / {}",
                or_dash(m.cursor_ms.map(clock)),
                or_dash(m.duration_ms.map(clock))
            ),
            remaining: or_dash(m.remaining_ms().map(clock)),
        }
    }
}

/// `mm:ss` (or `h:mm:ss`) from milliseconds.
fn clock(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

// ── Detail views ────────────────────────────────────────────────────

fn session_detail(s: &SessionState) -> String {
    let mut out = String::new();
    if let Some(ref remote) = s.remote {
        let _ = writeln!(
            out,
            "Remote:        {} (protocol {}, {})",
            or_dash(remote.app_version.as_deref()),
            or_dash(remote.protocol_version.as_deref()),
            or_dash(remote.platform_description.as_deref()),
        );
    }
    let _ = writeln!(out, "Studio mode:   {}", s.studio_mode);
    let _ = writeln!(out, "Program:       {}", or_dash(s.program_scene.as_deref()));
    if s.studio_mode {
        let _ = writeln!(out, "Preview:       {}", or_dash(s.preview_scene.as_deref()));
    }
    let _ = writeln!(
        out,
        "Transition:    {} ({} ms){}",
        or_dash(s.transition.current.as_deref()),
        or_dash(s.transition.duration_ms),
        if s.transition.active { ", running" } else { "" },
    );
    let _ = writeln!(out, "Profile:       {}", or_dash(s.profiles.current.as_deref()));
    let _ = writeln!(
        out,
        "Collection:    {}{}",
        or_dash(s.scene_collections.current.as_deref()),
        if s.collection_changing { " (changing)" } else { "" },
    );
    if let Some(ref video) = s.video {
        let _ = writeln!(
            out,
            "Video:         {}x{} -> {}x{} @ {}",
            video.base_width,
            video.base_height,
            video.output_width,
            video.output_height,
            or_dash(video.fps().map(|f| format!("{f:.2}"))),
        );
    }
    let _ = writeln!(
        out,
        "Stream:        {}{}",
        if s.stream.active { "live" } else { "off" },
        s.stream
            .timecode
            .as_deref()
            .map(|t| format!(" {t}"))
            .unwrap_or_default(),
    );
    let _ = writeln!(
        out,
        "Record:        {}{}",
        s.record.state,
        s.record
            .timecode
            .as_deref()
            .map(|t| format!(" {t}"))
            .unwrap_or_default(),
    );
    let _ = writeln!(out, "Replay buffer: {}", on_off(s.replay_buffer.active));
    let _ = writeln!(out, "Virtual cam:   {}", on_off(s.virtual_cam_active));
    let _ = writeln!(out, "Current media: {}", or_dash(s.current_media.as_deref()));
    let _ = write!(out, "DSK tabs:      {}", s.dsk.tab_count);
    out
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn counters_detail(c: &Counters) -> String {
    let mut out = String::new();
    match c.stats {
        Some(ref s) => {
            let _ = writeln!(out, "CPU:            {:.1}%", s.cpu_usage);
            let _ = writeln!(out, "Memory:         {:.1} MB", s.memory_usage_mb);
            let _ = writeln!(out, "Disk free:      {:.0} MB", s.available_disk_space_mb);
            let _ = writeln!(out, "FPS:            {:.2}", s.active_fps);
            let _ = writeln!(
                out,
                "Render time:    {:.2} ms",
                s.average_frame_render_time_ms
            );
            let _ = writeln!(
                out,
                "Render skipped: {}/{}",
                s.render_skipped_frames, s.render_total_frames
            );
            let _ = write!(
                out,
                "Output skipped: {}/{}",
                s.output_skipped_frames, s.output_total_frames
            );
        }
        None => {
            let _ = write!(out, "No stats received yet");
        }
    }
    for (input, peak) in &c.peaks {
        let _ = write!(out, "\nPeak {input}: {peak:.1} dB");
    }
    out
}

fn choices_detail(lists: &ChoiceLists) -> String {
    let value = serde_json::to_value(lists).unwrap_or_default();
    let mut out = String::new();
    if let serde_json::Value::Object(map) = value {
        for (key, list) in map {
            if let serde_json::Value::Array(items) = list {
                let labels: Vec<&str> = items
                    .iter()
                    .filter_map(|c| c.get("label").and_then(serde_json::Value::as_str))
                    .collect();
                let _ = writeln!(out, "{key}: {}", labels.join(", "));
            }
        }
    }
    out.trim_end().to_owned()
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(remote: &Remote, args: &SnapshotArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let engine = &remote.engine;
    let format = &global.output;

    let out = match args.section {
        Section::Scenes => {
            let session = engine.session();
            output::render_list(
                format,
                &engine.scenes_snapshot(),
                |s| scene_row(s, &session),
                |s| s.name.clone(),
            )?
        }
        Section::Items => {
            let snap = engine.scene_items_snapshot();
            let lines: Vec<ItemLine<'_>> = snap
                .iter()
                .flat_map(|si| {
                    si.items.iter().map(|item| ItemLine {
                        scene: &si.scene,
                        item,
                    })
                })
                .collect();
            output::render_list(format, &lines, |l| ItemRow::from(l), |l| {
                format!("{}\t{}", l.scene, l.item.source_name)
            })?
        }
        Section::Sources => output::render_list(
            format,
            &engine.sources_snapshot(),
            |s| SourceRow::from(s),
            |s| s.name.clone(),
        )?,
        Section::Filters => {
            let snap = engine.filters_snapshot();
            let lines: Vec<FilterLine<'_>> = snap
                .iter()
                .flat_map(|sf| {
                    sf.filters.iter().map(|filter| FilterLine {
                        source: &sf.source,
                        filter,
                    })
                })
                .collect();
            output::render_list(format, &lines, |l| FilterRow::from(l), |l| {
                format!("{}\t{}", l.source, l.filter.name)
            })?
        }
        Section::Transitions => {
            let current = engine.session().transition.current;
            output::render_list(
                format,
                &engine.transitions_snapshot(),
                |t: &Arc<Transition>| TransitionRow {
                    name: t.name.clone(),
                    kind: t.kind.clone(),
                    fixed: check(t.fixed),
                    current: check(current.as_deref() == Some(t.name.as_str())),
                },
                |t| t.name.clone(),
            )?
        }
        Section::Outputs => output::render_list(
            format,
            &engine.outputs_snapshot(),
            |o| OutputRow::from(o),
            |o| o.name.clone(),
        )?,
        Section::Media => output::render_list(
            format,
            &engine.media_snapshot(),
            |m| MediaRow::from(m),
            |m| m.input_name.clone(),
        )?,
        Section::Session => output::render_single(format, &engine.session(), session_detail, |s| {
            s.program_scene.clone().unwrap_or_default()
        })?,
        Section::Stats => output::render_single(format, &engine.counters(), counters_detail, |c| {
            c.stats
                .as_ref()
                .map(|s| format!("{:.1}", s.cpu_usage))
                .unwrap_or_default()
        })?,
        Section::Choices => {
            let lists = Arc::clone(&engine.choice_lists().borrow());
            output::render_single(format, &*lists, choices_detail, choices_detail)?
        }
    };

    output::print_output(&out, global.quiet);
    Ok(())
}
