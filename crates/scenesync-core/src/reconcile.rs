// ── Event reconciler ──
//
// Applies one typed push event to the store. Handlers never perform I/O:
// when a payload is insufficient they ask the engine for a follow-up
// request instead. Every leaf write records a revision mark so a slower
// builder response cannot roll it back.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, trace, warn};

use crate::event::{Event, EventScope, ItemPosition, MeterReading};
use crate::model::scene::ItemList;
use crate::model::{
    AudioState, MediaState, MediaStatus, MonitorType, RecordState, Scene, VIRTUALCAM_OUTPUT,
    VendorEvent,
};
use crate::store::{ChangeSet, StateStore, field};

/// Vendor that owns the downstream-keyer plugin.
pub const DSK_VENDOR: &str = "downstream-keyer";

/// Request the engine must issue on the reconciler's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FollowUp {
    RebuildSourceList { scene: String },
    RebuildGroup { group: String },
    RefreshFilters { source: String },
    ProbeAudio { source: String },
    FetchCurrentTransition,
    FetchPreviewScene,
    RebuildCollection,
    RefreshRemoteInfo,
    RebuildDskTabs,
    ConnectionLost,
}

/// Outcome of applying an event or a builder response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    pub changes: ChangeSet,
    pub follow_ups: Vec<FollowUp>,
}

impl Reaction {
    pub fn changed(changes: ChangeSet) -> Self {
        Self {
            changes,
            follow_ups: Vec::new(),
        }
    }

    pub fn follow_up(follow_up: FollowUp) -> Self {
        Self {
            changes: ChangeSet::empty(),
            follow_ups: vec![follow_up],
        }
    }

    pub fn with(mut self, follow_up: FollowUp) -> Self {
        self.follow_ups.push(follow_up);
        self
    }

    pub fn merge(&mut self, other: Reaction) {
        self.changes |= other.changes;
        for f in other.follow_ups {
            if !self.follow_ups.contains(&f) {
                self.follow_ups.push(f);
            }
        }
    }

    pub(crate) fn when(changed: bool, changes: ChangeSet) -> Self {
        Self::changed(if changed { changes } else { ChangeSet::empty() })
    }
}

/// Apply one event to the store.
pub fn apply(store: &StateStore, event: Event) -> Reaction {
    let _guard = store.lock_structure();

    if event.scope() == EventScope::Collection && store.is_suspended() {
        debug!(event = event.kind().as_ref(), "collection switch in progress, event dropped");
        return Reaction::default();
    }

    match event {
        // ── General ──
        Event::ExitStarted {} => Reaction::follow_up(FollowUp::ConnectionLost),
        Event::VendorEvent {
            vendor_name,
            event_type,
            event_data,
        } => {
            let dsk = vendor_name == DSK_VENDOR && event_type == "dsk_updated";
            store.update_session(|s| {
                s.last_vendor_event = Some(VendorEvent {
                    vendor_name,
                    event_type,
                    event_data,
                });
            });
            let reaction = Reaction::changed(ChangeSet::VENDOR);
            if dsk {
                reaction.with(FollowUp::RebuildDskTabs)
            } else {
                reaction
            }
        }

        // ── Config ──
        Event::CurrentSceneCollectionChanging { .. } => {
            store.suspend();
            Reaction::changed(ChangeSet::COLLECTIONS)
        }
        Event::CurrentSceneCollectionChanged {
            scene_collection_name,
        } => {
            store.drop_collection_state();
            store.mark(field::SESSION, field::COLLECTION);
            store.update_session(|s| {
                s.collection_changing = false;
                s.scene_collections.current = Some(scene_collection_name);
            });
            Reaction::changed(
                ChangeSet::COLLECTIONS
                    | ChangeSet::SCENES
                    | ChangeSet::SCENE_ITEMS
                    | ChangeSet::GROUPS
                    | ChangeSet::SOURCES
                    | ChangeSet::FILTERS
                    | ChangeSet::MEDIA
                    | ChangeSet::PROGRAM
                    | ChangeSet::DSK,
            )
            .with(FollowUp::RebuildCollection)
            .with(FollowUp::RefreshRemoteInfo)
        }
        Event::SceneCollectionListChanged { scene_collections } => {
            let changed = store.update_session(|s| s.scene_collections.names = scene_collections);
            Reaction::when(changed, ChangeSet::COLLECTIONS)
        }
        Event::CurrentProfileChanged { profile_name } => {
            store.mark(field::SESSION, field::PROFILE);
            store.update_session(|s| s.profiles.current = Some(profile_name));
            Reaction::changed(ChangeSet::PROFILES).with(FollowUp::RefreshRemoteInfo)
        }
        Event::ProfileListChanged { profiles } => {
            let changed = store.update_session(|s| s.profiles.names = profiles);
            Reaction::when(changed, ChangeSet::PROFILES)
        }

        // ── Scenes ──
        Event::SceneCreated {
            scene_name,
            is_group,
        } => scene_created(store, scene_name, is_group),
        Event::SceneRemoved {
            scene_name,
            is_group,
        } => scene_removed(store, &scene_name, is_group),
        Event::SceneNameChanged {
            old_scene_name,
            scene_name,
        } => scene_renamed(store, &old_scene_name, &scene_name),
        Event::CurrentProgramSceneChanged { scene_name } => {
            store.mark(field::SESSION, field::PROGRAM);
            let changed = store.update_session(|s| s.program_scene = Some(scene_name));
            Reaction::when(changed, ChangeSet::PROGRAM)
        }
        Event::CurrentPreviewSceneChanged { scene_name } => {
            store.mark(field::SESSION, field::PREVIEW);
            let changed = store.update_session(|s| s.preview_scene = Some(scene_name));
            Reaction::when(changed, ChangeSet::PROGRAM)
        }
        Event::SceneListChanged { scenes } => scene_list_changed(store, scenes),

        // ── Inputs ──
        Event::InputRemoved { input_name } => input_removed(store, &input_name),
        Event::InputNameChanged {
            old_input_name,
            input_name,
        } => {
            let mut changes = rename_source(store, &old_input_name, &input_name);
            changes |= rewrite_item_references(store, &old_input_name, &input_name);
            Reaction::changed(changes)
        }
        Event::InputActiveStateChanged {
            input_name,
            video_active,
        } => {
            store.mark(&input_name, field::ACTIVE);
            let changed = store.sources.update(&input_name, |s| s.active = video_active);
            Reaction::when(changed, ChangeSet::SOURCES)
        }
        Event::InputShowStateChanged {
            input_name,
            video_showing,
        } => {
            store.mark(&input_name, field::ACTIVE);
            let changed = store
                .sources
                .update(&input_name, |s| s.video_showing = video_showing);
            Reaction::when(changed, ChangeSet::SOURCES)
        }
        Event::InputMuteStateChanged {
            input_name,
            input_muted,
        } => update_audio(store, &input_name, field::MUTE, |a| a.muted = input_muted),
        Event::InputVolumeChanged {
            input_name,
            input_volume_db,
            input_volume_mul,
        } => update_audio(store, &input_name, field::VOLUME, |a| {
            a.volume_db = input_volume_db;
            a.volume_mul = input_volume_mul;
        }),
        Event::InputAudioBalanceChanged {
            input_name,
            input_audio_balance,
        } => update_audio(store, &input_name, field::BALANCE, |a| {
            a.balance = input_audio_balance;
        }),
        Event::InputAudioSyncOffsetChanged {
            input_name,
            input_audio_sync_offset,
        } => update_audio(store, &input_name, field::SYNC_OFFSET, |a| {
            a.sync_offset_ms = input_audio_sync_offset;
        }),
        Event::InputAudioMonitorTypeChanged {
            input_name,
            monitor_type,
        } => update_audio(store, &input_name, field::MONITOR_TYPE, |a| {
            a.monitor_type = MonitorType::from_wire(&monitor_type);
        }),
        Event::InputAudioTracksChanged {
            input_name,
            input_audio_tracks,
        } => update_audio(store, &input_name, field::TRACKS, |a| {
            a.tracks = input_audio_tracks;
        }),
        Event::InputVolumeMeters { inputs } => {
            let peaks = peak_levels(&inputs);
            let changed = store.update_counters(|c| c.peaks = peaks);
            Reaction::when(changed, ChangeSet::METERS)
        }
        Event::InputSettingsChanged {
            input_name,
            input_settings,
        } => {
            store.mark(&input_name, field::SETTINGS);
            let changed = store
                .sources
                .update(&input_name, |s| s.settings = Some(input_settings));
            Reaction::when(changed, ChangeSet::SOURCES)
        }

        // ── Transitions ──
        Event::CurrentSceneTransitionChanged { transition_name } => {
            store.mark(field::SESSION, field::TRANSITION);
            store.update_session(|s| s.transition.current = Some(transition_name));
            Reaction::changed(ChangeSet::TRANSITIONS).with(FollowUp::FetchCurrentTransition)
        }
        Event::CurrentSceneTransitionDurationChanged {
            transition_duration,
        } => {
            store.mark(field::SESSION, field::TRANSITION_DURATION);
            let changed =
                store.update_session(|s| s.transition.duration_ms = Some(transition_duration));
            Reaction::when(changed, ChangeSet::TRANSITIONS)
        }
        Event::SceneTransitionStarted {} => {
            let changed = store.update_session(|s| s.transition.active = true);
            Reaction::when(changed, ChangeSet::TRANSITIONS)
        }
        Event::SceneTransitionEnded {} => {
            let changed = store.update_session(|s| s.transition.active = false);
            Reaction::when(changed, ChangeSet::TRANSITIONS)
        }

        // ── Filters ──
        Event::SourceFilterCreated { source_name, .. } => {
            store.mark(&source_name, field::FILTERS);
            Reaction::follow_up(FollowUp::RefreshFilters {
                source: source_name,
            })
        }
        Event::SourceFilterRemoved {
            source_name,
            filter_name,
        } => {
            store.mark(&source_name, field::FILTERS);
            let changed = store
                .filters
                .update(&source_name, |f| f.filters.retain(|x| x.name != filter_name));
            Reaction::when(changed, ChangeSet::FILTERS)
        }
        Event::SourceFilterNameChanged {
            source_name,
            old_filter_name,
            filter_name,
        } => {
            store.mark(&source_name, field::FILTERS);
            let changed = store.filters.update(&source_name, |f| {
                if let Some(filter) = f.filter_mut(&old_filter_name) {
                    filter.name = filter_name;
                }
            });
            Reaction::when(changed, ChangeSet::FILTERS)
        }
        Event::SourceFilterEnableStateChanged {
            source_name,
            filter_name,
            filter_enabled,
        } => {
            store.mark(&source_name, field::FILTERS);
            let changed = store.filters.update(&source_name, |f| {
                if let Some(filter) = f.filter_mut(&filter_name) {
                    filter.enabled = filter_enabled;
                }
            });
            Reaction::when(changed, ChangeSet::FILTERS)
        }
        Event::SourceFilterListReindexed {
            source_name,
            filters,
        } => {
            store.mark(&source_name, field::FILTERS);
            let changed = store.filters.update(&source_name, |f| {
                for entry in &filters {
                    if let Some(filter) = f.filter_mut(&entry.filter_name) {
                        filter.index = entry.filter_index;
                    }
                }
                f.filters.sort_by_key(|x| x.index);
            });
            Reaction::when(changed, ChangeSet::FILTERS)
        }

        // ── Scene items ──
        Event::SceneItemCreated { scene_name } => {
            // Only a rebuild started after this event may publish the list.
            store.mark(&scene_name, field::ITEMS);
            if store.groups.contains(&scene_name) {
                Reaction::follow_up(FollowUp::RebuildGroup { group: scene_name })
            } else {
                Reaction::follow_up(FollowUp::RebuildSourceList { scene: scene_name })
            }
        }
        Event::SceneItemRemoved {
            scene_name,
            scene_item_id,
        } => scene_item_removed(store, &scene_name, scene_item_id),
        Event::SceneItemListReindexed {
            scene_name,
            scene_items,
        } => scene_items_reindexed(store, &scene_name, &scene_items),
        Event::SceneItemEnableStateChanged {
            scene_name,
            scene_item_id,
            scene_item_enabled,
        } => {
            store.mark(&scene_name, field::ITEMS);
            let set = |list: &mut dyn ItemList| {
                if let Some(item) = list.item_mut(scene_item_id) {
                    item.enabled = scene_item_enabled;
                }
            };
            if store.groups.contains(&scene_name) {
                let changed = store.groups.update(&scene_name, |g| set(g));
                Reaction::when(changed, ChangeSet::GROUPS)
            } else {
                let changed = store.scene_items.update(&scene_name, |s| set(s));
                Reaction::when(changed, ChangeSet::SCENE_ITEMS)
            }
        }

        // ── Outputs ──
        Event::StreamStateChanged { output_active, .. } => {
            store.mark(field::SESSION, field::STREAM);
            let changed = store.update_session(|s| s.stream.active = output_active);
            Reaction::when(changed, ChangeSet::OUTPUTS)
        }
        Event::RecordStateChanged {
            output_active,
            output_state,
            output_path,
        } => {
            store.mark(field::SESSION, field::RECORD);
            let state =
                RecordState::from_flags(output_active, output_state.ends_with("OUTPUT_PAUSED"));
            let changed = store.update_session(|s| {
                s.record.state = state;
                if state == RecordState::Stopped {
                    s.record.timecode = None;
                }
                if output_path.is_some() {
                    s.record.output_path = output_path;
                }
            });
            Reaction::when(changed, ChangeSet::OUTPUTS)
        }
        Event::ReplayBufferStateChanged { output_active, .. } => {
            store.mark(field::SESSION, field::REPLAY);
            let changed = store.update_session(|s| s.replay_buffer.active = output_active);
            Reaction::when(changed, ChangeSet::OUTPUTS)
        }
        Event::VirtualcamStateChanged { output_active, .. } => {
            store.mark(VIRTUALCAM_OUTPUT, field::OUTPUT);
            let session = store.update_session(|s| s.virtual_cam_active = output_active);
            let output = store
                .outputs
                .update(VIRTUALCAM_OUTPUT, |o| o.active = output_active);
            Reaction::when(session || output, ChangeSet::OUTPUTS)
        }
        Event::ReplayBufferSaved { saved_replay_path } => {
            let changed =
                store.update_session(|s| s.replay_buffer.last_saved_path = Some(saved_replay_path));
            Reaction::when(changed, ChangeSet::OUTPUTS)
        }

        // ── Media inputs ──
        Event::MediaInputPlaybackStarted { input_name } => {
            store.update_session(|s| s.current_media = Some(input_name.clone()));
            set_media_state(store, &input_name, MediaState::Playing);
            Reaction::changed(ChangeSet::MEDIA)
        }
        Event::MediaInputPlaybackEnded { input_name } => {
            store.update_session(|s| {
                if s.current_media.as_deref() == Some(input_name.as_str()) {
                    s.current_media = None;
                }
            });
            set_media_state(store, &input_name, MediaState::Ended);
            Reaction::changed(ChangeSet::MEDIA)
        }
        Event::MediaInputActionTriggered {
            input_name,
            media_action,
        } => match MediaState::from_action(&media_action) {
            Some(state) => {
                set_media_state(store, &input_name, state);
                Reaction::changed(ChangeSet::MEDIA)
            }
            None => Reaction::default(),
        },

        // ── UI ──
        Event::StudioModeStateChanged {
            studio_mode_enabled,
        } => {
            store.mark(field::SESSION, field::STUDIO_MODE);
            if studio_mode_enabled {
                store.update_session(|s| s.studio_mode = true);
                Reaction::changed(ChangeSet::PROGRAM).with(FollowUp::FetchPreviewScene)
            } else {
                store.mark(field::SESSION, field::PREVIEW);
                store.update_session(|s| {
                    s.studio_mode = false;
                    s.preview_scene = None;
                });
                Reaction::changed(ChangeSet::PROGRAM)
            }
        }

        // ── Inert ──
        Event::CurrentProfileChanging {}
        | Event::InputCreated { .. }
        | Event::SceneTransitionVideoEnded {}
        | Event::SceneItemLockStateChanged {}
        | Event::SceneItemSelected {}
        | Event::SceneItemTransformChanged {} => Reaction::default(),
        Event::Unrecognized { event_type } => {
            trace!(%event_type, "ignoring unrecognized event");
            Reaction::default()
        }
        Event::Malformed { event_type, reason } => {
            warn!(%event_type, %reason, "dropping malformed event");
            Reaction::default()
        }
    }
}

// ── Scenes ──────────────────────────────────────────────────────────

fn scene_created(store: &StateStore, name: String, is_group: bool) -> Reaction {
    store.mark(&name, field::EXISTS);
    if is_group {
        return Reaction::follow_up(FollowUp::RebuildGroup { group: name });
    }
    if !store.scenes.contains(&name) {
        store.scenes.upsert(
            name.clone(),
            Scene {
                name: name.clone(),
                index: None,
            },
        );
    }
    Reaction::changed(ChangeSet::SCENES).with(FollowUp::RebuildSourceList { scene: name })
}

fn scene_removed(store: &StateStore, name: &str, is_group: bool) -> Reaction {
    store.mark(name, field::EXISTS);
    let mut changes = ChangeSet::empty();
    if is_group {
        if store.groups.remove(name).is_some() {
            changes |= ChangeSet::GROUPS;
        }
    } else {
        if store.scenes.remove(name).is_some() {
            changes |= ChangeSet::SCENES;
        }
        if store.scene_items.remove(name).is_some() {
            changes |= ChangeSet::SCENE_ITEMS;
        }
    }
    if store.prune_orphans() {
        changes |= ChangeSet::SOURCES | ChangeSet::FILTERS | ChangeSet::MEDIA;
    }
    Reaction::changed(changes)
}

/// Scenes and groups are sources too: a rename moves the scene record,
/// its item index, any source/filter records under the same name, and
/// every reference to it.
fn scene_renamed(store: &StateStore, old: &str, new: &str) -> Reaction {
    let mut changes = ChangeSet::empty();

    if store
        .scenes
        .rename(old, new, |s| new.clone_into(&mut s.name))
        .is_some()
    {
        changes |= ChangeSet::SCENES;
    }
    if store
        .scene_items
        .rename(old, new, |s| new.clone_into(&mut s.scene))
        .is_some()
    {
        changes |= ChangeSet::SCENE_ITEMS;
    }
    if store
        .groups
        .rename(old, new, |g| new.clone_into(&mut g.name))
        .is_some()
    {
        changes |= ChangeSet::GROUPS;
    }
    changes |= rename_source(store, old, new);
    changes |= rewrite_item_references(store, old, new);

    for source in store.sources.keys() {
        store.sources.update(&source, |s| {
            if s.group.as_deref() == Some(old) {
                s.group = Some(new.to_owned());
            }
        });
    }
    let renamed = |slot: &mut Option<String>| {
        if slot.as_deref() == Some(old) {
            *slot = Some(new.to_owned());
        }
    };
    if store.update_session(|s| {
        renamed(&mut s.program_scene);
        renamed(&mut s.preview_scene);
    }) {
        changes |= ChangeSet::PROGRAM;
    }
    Reaction::changed(changes)
}

fn scene_list_changed(
    store: &StateStore,
    scenes: Vec<scenesync_api::responses::SceneEntry>,
) -> Reaction {
    let incoming: HashSet<String> = scenes.iter().map(|s| s.scene_name.clone()).collect();
    let mut reaction = Reaction::default();

    for entry in scenes {
        let name = entry.scene_name.clone();
        if !store.scenes.contains(&name) {
            store.mark(&name, field::EXISTS);
            reaction.follow_ups.push(FollowUp::RebuildSourceList {
                scene: name.clone(),
            });
        }
        if store.scenes.upsert(name, Scene::from(entry)) {
            reaction.changes |= ChangeSet::SCENES;
        }
    }

    let removed = store.scenes.retain(|name, _| incoming.contains(name));
    for name in &removed {
        store.mark(name, field::EXISTS);
        store.scene_items.remove(name);
        reaction.changes |= ChangeSet::SCENES | ChangeSet::SCENE_ITEMS;
    }
    if !removed.is_empty() && store.prune_orphans() {
        reaction.changes |= ChangeSet::SOURCES;
    }
    reaction
}

fn scene_item_removed(store: &StateStore, scene: &str, id: i64) -> Reaction {
    store.mark(scene, field::ITEMS);
    let mut changes = ChangeSet::empty();
    if store.groups.contains(scene) {
        if store.groups.update(scene, |g| {
            g.remove_item(id);
        }) {
            changes |= ChangeSet::GROUPS;
        }
    } else if store.scene_items.update(scene, |s| {
        s.remove_item(id);
    }) {
        changes |= ChangeSet::SCENE_ITEMS;
    }
    if store.prune_orphans() {
        changes |= ChangeSet::SOURCES | ChangeSet::FILTERS | ChangeSet::MEDIA;
    }
    Reaction::changed(changes)
}

fn scene_items_reindexed(store: &StateStore, scene: &str, positions: &[ItemPosition]) -> Reaction {
    store.mark(scene, field::ITEMS);
    let order: Vec<(i64, i64)> = positions
        .iter()
        .map(|p| (p.scene_item_id, p.scene_item_index))
        .collect();
    if store.groups.contains(scene) {
        let changed = store.groups.update(scene, |g| g.reindex(&order));
        Reaction::when(changed, ChangeSet::GROUPS)
    } else {
        let changed = store.scene_items.update(scene, |s| s.reindex(&order));
        Reaction::when(changed, ChangeSet::SCENE_ITEMS)
    }
}

// ── Inputs ──────────────────────────────────────────────────────────

fn input_removed(store: &StateStore, name: &str) -> Reaction {
    store.mark(name, field::EXISTS);
    let mut changes = ChangeSet::empty();
    if store.drop_source(name) {
        changes |= ChangeSet::SOURCES | ChangeSet::AUDIO | ChangeSet::FILTERS | ChangeSet::MEDIA;
    }
    for scene in store.scene_items.keys() {
        if store
            .scene_items
            .update(&scene, |s| s.items.retain(|i| i.source_name != name))
        {
            store.mark(&scene, field::ITEMS);
            changes |= ChangeSet::SCENE_ITEMS;
        }
    }
    for group in store.groups.keys() {
        if store
            .groups
            .update(&group, |g| g.items.retain(|i| i.source_name != name))
        {
            store.mark(&group, field::ITEMS);
            changes |= ChangeSet::GROUPS;
        }
    }
    store.update_session(|s| {
        if s.current_media.as_deref() == Some(name) {
            s.current_media = None;
        }
    });
    Reaction::changed(changes)
}

/// Move a source and everything keyed by its name. Runtime fields
/// travel with the record.
fn rename_source(store: &StateStore, old: &str, new: &str) -> ChangeSet {
    store.move_marks(old, new);
    store.mark(old, field::EXISTS);
    store.mark(new, field::EXISTS);

    let mut changes = ChangeSet::empty();
    if store
        .sources
        .rename(old, new, |s| new.clone_into(&mut s.name))
        .is_some()
    {
        changes |= ChangeSet::SOURCES;
    }
    if store
        .filters
        .rename(old, new, |f| new.clone_into(&mut f.source))
        .is_some()
    {
        changes |= ChangeSet::FILTERS;
    }
    if store
        .media
        .rename(old, new, |m| new.clone_into(&mut m.input_name))
        .is_some()
    {
        changes |= ChangeSet::MEDIA;
    }
    store.update_counters(|c| {
        if let Some(peak) = c.peaks.remove(old) {
            c.peaks.insert(new.to_owned(), peak);
        }
    });
    store.update_session(|s| {
        if s.current_media.as_deref() == Some(old) {
            s.current_media = Some(new.to_owned());
        }
    });
    changes
}

fn rewrite_item_references(store: &StateStore, old: &str, new: &str) -> ChangeSet {
    let mut changes = ChangeSet::empty();
    for scene in store.scene_items.keys() {
        if store
            .scene_items
            .get(&scene)
            .is_some_and(|s| s.references(old))
        {
            store.scene_items.update(&scene, |s| s.rename_source(old, new));
            store.mark(&scene, field::ITEMS);
            changes |= ChangeSet::SCENE_ITEMS;
        }
    }
    for group in store.groups.keys() {
        if store.groups.get(&group).is_some_and(|g| g.references(old)) {
            store.groups.update(&group, |g| g.rename_source(old, new));
            store.mark(&group, field::ITEMS);
            changes |= ChangeSet::GROUPS;
        }
    }
    changes
}

fn update_audio(
    store: &StateStore,
    input: &str,
    audio_field: &'static str,
    f: impl FnOnce(&mut AudioState),
) -> Reaction {
    store.mark(input, audio_field);
    let changed = store
        .sources
        .update(input, |s| f(s.audio.get_or_insert_with(AudioState::default)));
    Reaction::when(changed, ChangeSet::AUDIO)
}

/// Peak of the first channel in dBFS, rounded to whole decibels. Inputs
/// reporting silence are left out.
fn peak_levels(inputs: &[MeterReading]) -> BTreeMap<String, f64> {
    inputs
        .iter()
        .filter_map(|input| {
            let peak = *input.input_levels_mul.first()?.get(1)?;
            (peak > 0.0).then(|| (input.input_name.clone(), (20.0 * peak.log10()).round()))
        })
        .collect()
}

fn set_media_state(store: &StateStore, input: &str, state: MediaState) {
    if !store.media.update(input, |m| m.state = state) && !store.media.contains(input) {
        store
            .media
            .upsert(input.to_owned(), MediaStatus::new(input, state));
    }
}
