// ── Derived choice lists ──
//
// Flat `{ id, label }` projections of the store for pickers. Never
// authoritative: rebuilt from scratch after every structural change.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{Choice, Monitor, Output, Source, SourceKind, VIRTUALCAM_OUTPUT};
use crate::store::StateStore;

pub const CURRENT_SCENE: &str = "Current Scene";
pub const PREVIEW_SCENE: &str = "Preview Scene";
pub const ANY_SCENE: &str = "anyScene";
pub const CUSTOM_SCENE_NAME: &str = "customSceneName";
pub const CURRENT_MEDIA: &str = "currentMedia";

/// Audio mix buses, program first.
pub const AUX_BUSES: [&str; 9] = [
    "PGM", "AUX1", "AUX2", "AUX3", "AUX4", "AUX5", "AUX6", "AUX7", "AUX8",
];

/// Mixer channel index the remote uses for an audio bus. Channel 1 is
/// unused between program and the first aux bus.
pub fn aux_bus_index(bus: &str) -> Option<u32> {
    let position = AUX_BUSES.iter().position(|b| *b == bus)?;
    let position = u32::try_from(position).ok()?;
    Some(if position == 0 { 0 } else { position + 1 })
}

/// Every choice list, computed together from one store state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceLists {
    pub scenes: Vec<Choice>,
    pub scenes_program_preview: Vec<Choice>,
    pub scenes_any: Vec<Choice>,
    pub scenes_custom: Vec<Choice>,
    pub sources: Vec<Choice>,
    pub sources_with_scenes: Vec<Choice>,
    pub text_sources: Vec<Choice>,
    pub media_sources: Vec<Choice>,
    pub media_sources_current: Vec<Choice>,
    pub image_sources: Vec<Choice>,
    pub filters: Vec<Choice>,
    pub audio_sources: Vec<Choice>,
    pub aux_buses: Vec<Choice>,
    pub profiles: Vec<Choice>,
    pub scene_collections: Vec<Choice>,
    pub transitions: Vec<Choice>,
    pub outputs: Vec<Choice>,
    pub hotkeys: Vec<Choice>,
    pub monitors: Vec<Choice>,
    pub image_formats: Vec<Choice>,
    /// One-based tab numbers.
    pub dsk_tabs: Vec<Choice>,
    /// Scene names per zero-based tab, for the tabs fetched so far.
    pub dsk_items: BTreeMap<u32, Vec<Choice>>,
    pub defaults: Defaults,
}

/// First entry of the main lists, or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    pub scene: String,
    pub source: String,
    pub filter: String,
    pub audio_source: String,
    pub profile: String,
}

impl ChoiceLists {
    pub fn build(store: &StateStore) -> Self {
        let session = store.session();
        let sources = store.sources_snapshot();

        let scenes = sorted(store.scene_names().iter().map(|n| Choice::named(n)));
        let named_sources = |keep: &dyn Fn(&Source) -> bool| {
            sorted(
                sources
                    .iter()
                    .filter(|s| keep(s))
                    .map(|s| Choice::named(&s.name)),
            )
        };

        let all_sources = named_sources(&|_| true);
        let text_sources = named_sources(&|s| s.is_editable_text());
        let media_sources = named_sources(&|s| s.is_media());
        let image_sources = named_sources(&|s| s.kind == SourceKind::Image);
        let audio_sources = named_sources(&|s| s.audio.is_some());

        let filters = sorted(
            store
                .filters_snapshot()
                .iter()
                .flat_map(|chain| chain.filters.iter())
                .map(|f| Choice::named(&f.name)),
        );

        let defaults = Defaults {
            scene: first_id(&scenes),
            source: first_id(&all_sources),
            filter: first_id(&filters),
            audio_source: first_id(&audio_sources),
            profile: session.profiles.names.first().cloned().unwrap_or_default(),
        };

        Self {
            scenes_program_preview: prepend(
                [Choice::named(CURRENT_SCENE), Choice::named(PREVIEW_SCENE)],
                &scenes,
            ),
            scenes_any: prepend([Choice::new(ANY_SCENE, "<ANY SCENE>")], &scenes),
            scenes_custom: prepend(
                [Choice::new(CUSTOM_SCENE_NAME, "<CUSTOM SCENE NAME>")],
                &scenes,
            ),
            sources_with_scenes: unique(all_sources.iter().chain(&scenes).cloned()),
            media_sources_current: prepend(
                [Choice::new(CURRENT_MEDIA, "<CURRENT MEDIA>")],
                &media_sources,
            ),
            aux_buses: AUX_BUSES.iter().map(|b| Choice::named(b)).collect(),
            profiles: unique(session.profiles.names.iter().map(|n| Choice::named(n))),
            scene_collections: unique(
                session
                    .scene_collections
                    .names
                    .iter()
                    .map(|n| Choice::named(n)),
            ),
            transitions: unique(
                store
                    .transitions_snapshot()
                    .iter()
                    .map(|t| Choice::named(&t.name)),
            ),
            outputs: unique(store.outputs_snapshot().iter().filter_map(|o| output_choice(o))),
            hotkeys: unique(session.hotkeys.iter().map(|h| Choice::named(h))),
            monitors: unique(session.monitors.iter().map(monitor_choice)),
            image_formats: unique(
                session
                    .remote
                    .iter()
                    .flat_map(|r| r.image_formats.iter())
                    .map(|f| Choice::named(f)),
            ),
            dsk_tabs: (1..=session.dsk.tab_count)
                .map(|n| Choice::named(&n.to_string()))
                .collect(),
            dsk_items: session
                .dsk
                .items
                .iter()
                .map(|(tab, scenes)| (*tab, unique(scenes.iter().map(|s| Choice::named(s)))))
                .collect(),
            scenes,
            sources: all_sources,
            text_sources,
            media_sources,
            image_sources,
            filters,
            audio_sources,
            defaults,
        }
    }
}

/// Outputs with dedicated singletons are not offered.
fn output_choice(output: &Output) -> Option<Choice> {
    if output.kind == VIRTUALCAM_OUTPUT {
        return Some(Choice::new(&output.name, "Virtual Camera"));
    }
    output.is_generic().then(|| Choice::named(&output.name))
}

fn monitor_choice(monitor: &Monitor) -> Choice {
    let name = monitor
        .name
        .clone()
        .unwrap_or_else(|| format!("Display {}", monitor.index));
    Choice::new(
        monitor.index.to_string(),
        format!("{name} ({}x{})", monitor.width, monitor.height),
    )
}

/// Drop repeated ids, keeping the first occurrence.
fn unique(choices: impl IntoIterator<Item = Choice>) -> Vec<Choice> {
    let mut seen = HashSet::new();
    choices
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect()
}

fn sorted(choices: impl IntoIterator<Item = Choice>) -> Vec<Choice> {
    let mut list: Vec<Choice> = choices.into_iter().collect();
    list.sort_by(|a, b| a.id.cmp(&b.id));
    list.dedup_by(|a, b| a.id == b.id);
    list
}

/// Sentinels in front of an already sorted list. A real entry that
/// collides with a sentinel id is dropped.
fn prepend<const N: usize>(sentinels: [Choice; N], list: &[Choice]) -> Vec<Choice> {
    unique(sentinels.into_iter().chain(list.iter().cloned()))
}

fn first_id(list: &[Choice]) -> String {
    list.first().map(|c| c.id.clone()).unwrap_or_default()
}
