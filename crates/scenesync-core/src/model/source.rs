// ── Source, filter, media and transition domain types ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Coarse source category, derived from the remote input kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Text,
    Media,
    Image,
    Audio,
    Scene,
    Group,
    Other,
}

impl SourceKind {
    /// Classify from the remote's `inputKind` / `sourceType`.
    pub fn classify(input_kind: Option<&str>, source_type: Option<&str>, is_group: bool) -> Self {
        if is_group {
            return Self::Group;
        }
        match input_kind {
            Some("text_ft2_source" | "text_ft2_source_v2" | "text_gdiplus" | "text_gdiplus_v2") => {
                Self::Text
            }
            Some("ffmpeg_source" | "vlc_source") => Self::Media,
            Some("image_source" | "slideshow") => Self::Image,
            Some(
                "wasapi_input_capture"
                | "wasapi_output_capture"
                | "wasapi_process_output_capture"
                | "coreaudio_input_capture"
                | "coreaudio_output_capture"
                | "pulse_input_capture"
                | "pulse_output_capture"
                | "alsa_input_capture"
                | "jack_output_capture",
            ) => Self::Audio,
            Some(_) => Self::Other,
            None => match source_type {
                Some(t) if t.ends_with("_SOURCE_TYPE_SCENE") => Self::Scene,
                _ => Self::Other,
            },
        }
    }
}

/// Audio monitoring mode. The remote prefixes the wire values with its
/// own vendor tag, so only the suffix is significant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum MonitorType {
    #[default]
    None,
    MonitorOnly,
    MonitorAndOutput,
}

impl MonitorType {
    pub fn from_wire(raw: &str) -> Self {
        if raw.ends_with("MONITORING_TYPE_MONITOR_AND_OUTPUT") {
            Self::MonitorAndOutput
        } else if raw.ends_with("MONITORING_TYPE_MONITOR_ONLY") {
            Self::MonitorOnly
        } else {
            Self::None
        }
    }
}

/// Audio properties of a source that answered the audio probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioState {
    pub muted: bool,
    pub volume_db: f64,
    pub volume_mul: f64,
    pub balance: f64,
    pub sync_offset_ms: i64,
    pub monitor_type: MonitorType,
    /// Track number (`"1"`..`"6"`) to enabled flag.
    pub tracks: BTreeMap<String, bool>,
}

/// An input, scene or group as seen through scene items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub kind: SourceKind,
    pub input_kind: Option<String>,
    pub source_type: Option<String>,
    pub active: bool,
    pub video_showing: bool,
    /// `Some` once the audio probe succeeded.
    pub audio: Option<AudioState>,
    pub settings: Option<Value>,
    /// Owning group, for sources discovered through a group.
    pub group: Option<String>,
    /// Audio-only pseudo-source from the special inputs list.
    pub special: bool,
}

impl Source {
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            input_kind: None,
            source_type: None,
            active: false,
            video_showing: false,
            audio: None,
            settings: None,
            group: None,
            special: false,
        }
    }

    pub fn is_input(&self) -> bool {
        self.input_kind.is_some()
    }

    pub fn is_media(&self) -> bool {
        self.kind == SourceKind::Media
    }

    /// Text sources that read from a file have no editable text.
    pub fn is_editable_text(&self) -> bool {
        self.kind == SourceKind::Text
            && !self
                .settings
                .as_ref()
                .and_then(|s| s.get("from_file"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    /// Fold a re-discovered record into the existing one. Identity fields
    /// come from `discovered`; runtime fields filled by events and probes
    /// survive.
    pub(crate) fn merge(self, discovered: Source) -> Source {
        Source {
            name: discovered.name,
            kind: discovered.kind,
            input_kind: discovered.input_kind.or(self.input_kind),
            source_type: discovered.source_type.or(self.source_type),
            active: self.active,
            video_showing: self.video_showing,
            audio: self.audio,
            settings: self.settings,
            group: discovered.group.or(self.group),
            special: self.special || discovered.special,
        }
    }
}

/// A filter attached to a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub kind: String,
    pub index: i64,
    pub enabled: bool,
}

/// Ordered filter chain of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFilters {
    pub source: String,
    pub filters: Vec<Filter>,
}

impl SourceFilters {
    pub(crate) fn filter_mut(&mut self, name: &str) -> Option<&mut Filter> {
        self.filters.iter_mut().find(|f| f.name == name)
    }
}

/// Playback state of a media input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum MediaState {
    #[default]
    None,
    Playing,
    Opening,
    Buffering,
    Paused,
    Stopped,
    Ended,
    Error,
}

impl MediaState {
    /// Parse a `*_MEDIA_STATE_*` wire value.
    pub fn from_wire(raw: &str) -> Self {
        let Some((_, state)) = raw.split_once("MEDIA_STATE_") else {
            return Self::None;
        };
        match state {
            "PLAYING" => Self::Playing,
            "OPENING" => Self::Opening,
            "BUFFERING" => Self::Buffering,
            "PAUSED" => Self::Paused,
            "STOPPED" => Self::Stopped,
            "ENDED" => Self::Ended,
            "ERROR" => Self::Error,
            _ => Self::None,
        }
    }

    /// State implied by a `*_MEDIA_INPUT_ACTION_*` trigger, if any.
    pub fn from_action(raw: &str) -> Option<Self> {
        match raw.split_once("MEDIA_INPUT_ACTION_")?.1 {
            "PLAY" | "RESTART" => Some(Self::Playing),
            "PAUSE" => Some(Self::Paused),
            "STOP" => Some(Self::Stopped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStatus {
    pub input_name: String,
    pub state: MediaState,
    pub cursor_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

impl MediaStatus {
    pub fn new(input_name: impl Into<String>, state: MediaState) -> Self {
        Self {
            input_name: input_name.into(),
            state,
            cursor_ms: None,
            duration_ms: None,
        }
    }

    pub fn remaining_ms(&self) -> Option<i64> {
        let remaining = self.duration_ms? - self.cursor_ms?;
        (remaining > 0).then_some(remaining)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub name: String,
    pub kind: String,
    pub fixed: bool,
    pub configurable: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_input_kinds() {
        assert_eq!(
            SourceKind::classify(Some("text_gdiplus_v2"), None, false),
            SourceKind::Text
        );
        assert_eq!(
            SourceKind::classify(Some("vlc_source"), None, false),
            SourceKind::Media
        );
        assert_eq!(
            SourceKind::classify(Some("pulse_input_capture"), None, false),
            SourceKind::Audio
        );
        assert_eq!(
            SourceKind::classify(None, Some("OBS_SOURCE_TYPE_SCENE"), false),
            SourceKind::Scene
        );
        assert_eq!(
            SourceKind::classify(None, Some("OBS_SOURCE_TYPE_SCENE"), true),
            SourceKind::Group
        );
        assert_eq!(
            SourceKind::classify(Some("browser_source"), None, false),
            SourceKind::Other
        );
    }

    #[test]
    fn wire_enums_ignore_vendor_prefix() {
        assert_eq!(
            MediaState::from_wire("CRE8_MEDIA_STATE_PLAYING"),
            MediaState::Playing
        );
        assert_eq!(
            MediaState::from_wire("OBS_MEDIA_STATE_PAUSED"),
            MediaState::Paused
        );
        assert_eq!(MediaState::from_wire("PLAYING"), MediaState::None);
        assert_eq!(
            MediaState::from_action("OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PAUSE"),
            Some(MediaState::Paused)
        );
        assert_eq!(
            MonitorType::from_wire("CRE8_MONITORING_TYPE_MONITOR_ONLY"),
            MonitorType::MonitorOnly
        );
    }

    #[test]
    fn merge_keeps_runtime_fields() {
        let mut existing = Source::new("Mic", SourceKind::Audio);
        existing.audio = Some(AudioState {
            muted: true,
            ..AudioState::default()
        });
        existing.active = true;

        let mut discovered = Source::new("Mic", SourceKind::Audio);
        discovered.input_kind = Some("pulse_input_capture".into());

        let merged = existing.merge(discovered);
        assert!(merged.active);
        assert!(merged.audio.unwrap().muted);
        assert_eq!(merged.input_kind.as_deref(), Some("pulse_input_capture"));
    }

    #[test]
    fn text_from_file_is_not_editable() {
        let mut text = Source::new("Lower Third", SourceKind::Text);
        text.settings = Some(json!({ "text": "Hello" }));
        assert!(text.is_editable_text());
        text.settings = Some(json!({ "from_file": true, "text_file": "/tmp/x.txt" }));
        assert!(!text.is_editable_text());
    }
}
