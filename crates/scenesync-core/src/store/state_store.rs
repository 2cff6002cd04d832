// ── Central reactive state store ──
//
// Thread-safe storage for the mirrored session. Collections are
// `DashMap`-backed; singletons live in `watch` channels. Two counters
// guard against stale writes: the generation (bumped on connect,
// disconnect and collection switches) and the per-field event revision.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio::sync::watch;

use super::collection::EntityCollection;
use crate::model::{
    Counters, Group, MediaStatus, Output, Scene, SceneItems, SessionState, Source, SourceFilters,
    SourceKind, Transition,
};
use crate::stream::EntityStream;

/// Field names used for revision marks.
pub(crate) mod field {
    /// Key for marks on session-wide singletons. Cannot collide with a
    /// scene, group or source name.
    pub const SESSION: &str = "\0session";

    /// Existence of a scene, group or source key. Names are unique
    /// across all three.
    pub const EXISTS: &str = "exists";
    pub const ITEMS: &str = "items";
    pub const ACTIVE: &str = "active";
    pub const SETTINGS: &str = "settings";
    pub const FILTERS: &str = "filters";
    pub const MUTE: &str = "mute";
    pub const VOLUME: &str = "volume";
    pub const BALANCE: &str = "balance";
    pub const SYNC_OFFSET: &str = "sync_offset";
    pub const MONITOR_TYPE: &str = "monitor_type";
    pub const TRACKS: &str = "tracks";
    pub const PROGRAM: &str = "program";
    pub const PREVIEW: &str = "preview";
    pub const TRANSITION: &str = "transition";
    pub const TRANSITION_DURATION: &str = "transition_duration";
    pub const STUDIO_MODE: &str = "studio_mode";
    pub const PROFILE: &str = "profile";
    pub const COLLECTION: &str = "collection";
    pub const OUTPUT: &str = "output";
    pub const STREAM: &str = "stream";
    pub const RECORD: &str = "record";
    pub const REPLAY: &str = "replay";
}

/// Snapshot of the store's freshness counters, taken when a request is
/// issued and checked when its response is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub revision: u64,
}

/// Central reactive store for the mirrored session.
pub struct StateStore {
    pub(crate) scenes: EntityCollection<Scene>,
    pub(crate) scene_items: EntityCollection<SceneItems>,
    pub(crate) groups: EntityCollection<Group>,
    pub(crate) sources: EntityCollection<Source>,
    pub(crate) filters: EntityCollection<SourceFilters>,
    pub(crate) transitions: EntityCollection<Transition>,
    pub(crate) outputs: EntityCollection<Output>,
    pub(crate) media: EntityCollection<MediaStatus>,
    session: watch::Sender<SessionState>,
    counters: watch::Sender<Counters>,
    generation: AtomicU64,
    revision: AtomicU64,
    marks: DashMap<(String, &'static str), u64>,
    structure: Mutex<()>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (session, _) = watch::channel(SessionState::default());
        let (counters, _) = watch::channel(Counters::default());

        Self {
            scenes: EntityCollection::new(),
            scene_items: EntityCollection::new(),
            groups: EntityCollection::new(),
            sources: EntityCollection::new(),
            filters: EntityCollection::new(),
            transitions: EntityCollection::new(),
            outputs: EntityCollection::new(),
            media: EntityCollection::new(),
            session,
            counters,
            generation: AtomicU64::new(0),
            revision: AtomicU64::new(0),
            marks: DashMap::new(),
            structure: Mutex::new(()),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start from scratch for a fresh session.
    pub fn initialize(&self) {
        let _guard = self.lock_structure();
        self.bump_generation();
        self.clear_collection_slices();
        self.transitions.clear();
        self.outputs.clear();
        self.marks.clear();
        self.session.send_replace(SessionState::default());
        self.counters.send_replace(Counters::default());
    }

    /// Drop everything that belongs to the scene collection being left.
    /// Profiles, outputs, transitions and remote info survive.
    pub fn reset_collection(&self) {
        let _guard = self.lock_structure();
        self.drop_collection_state();
    }

    /// [`reset_collection`](Self::reset_collection) for callers already
    /// holding the structure lock.
    pub(crate) fn drop_collection_state(&self) {
        self.bump_generation();
        self.clear_collection_slices();
        self.session.send_if_modified(|s| {
            let before = s.clone();
            s.program_scene = None;
            s.preview_scene = None;
            s.current_media = None;
            s.dsk = crate::model::DskState::default();
            *s != before
        });
        self.counters.send_if_modified(|c| {
            let had_peaks = !c.peaks.is_empty();
            c.peaks.clear();
            had_peaks
        });
    }

    /// Invalidate every in-flight request without touching data.
    pub fn reset(&self) {
        self.bump_generation();
    }

    /// Enter the collection-switch window: per-collection events are
    /// ignored and in-flight builders are discarded.
    pub fn suspend(&self) {
        self.bump_generation();
        self.update_session(|s| s.collection_changing = true);
    }

    pub fn resume(&self) {
        self.update_session(|s| s.collection_changing = false);
    }

    pub fn is_suspended(&self) -> bool {
        self.session.borrow().collection_changing
    }

    fn clear_collection_slices(&self) {
        self.scenes.clear();
        self.scene_items.clear();
        self.groups.clear();
        self.sources.clear();
        self.filters.clear();
        self.media.clear();
    }

    // ── Freshness ────────────────────────────────────────────────────

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation(),
            revision: self.revision.load(Ordering::Acquire),
        }
    }

    /// Whether a response issued under `ticket` may still be applied.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation()
    }

    /// Whether `field` of `key` was left untouched by events since
    /// `ticket` was taken.
    pub fn is_fresh(&self, ticket: &Ticket, key: &str, field: &'static str) -> bool {
        self.is_current(ticket)
            && self
                .marks
                .get(&(key.to_owned(), field))
                .is_none_or(|rev| *rev <= ticket.revision)
    }

    /// Record that an event just wrote `field` of `key`.
    pub(crate) fn mark(&self, key: &str, field: &'static str) {
        let rev = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        self.marks.insert((key.to_owned(), field), rev);
    }

    /// Move every mark recorded for `old` over to `new`.
    pub(crate) fn move_marks(&self, old: &str, new: &str) {
        let moved: Vec<(&'static str, u64)> = self
            .marks
            .iter()
            .filter(|e| e.key().0 == old)
            .map(|e| (e.key().1, *e.value()))
            .collect();
        for (field, rev) in moved {
            self.marks.remove(&(old.to_owned(), field));
            self.marks.insert((new.to_owned(), field), rev);
        }
    }

    /// Serializes structural read-modify-write sequences (event handlers,
    /// builder applies, orphan pruning) against each other.
    pub(crate) fn lock_structure(&self) -> MutexGuard<'_, ()> {
        self.structure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Singletons ───────────────────────────────────────────────────

    /// Mutate the session singleton, publishing only on change.
    pub(crate) fn update_session(&self, f: impl FnOnce(&mut SessionState)) -> bool {
        self.session.send_if_modified(|s| {
            let before = s.clone();
            f(s);
            *s != before
        })
    }

    pub(crate) fn update_counters(&self, f: impl FnOnce(&mut Counters)) -> bool {
        self.counters.send_if_modified(|c| {
            let before = c.clone();
            f(c);
            *c != before
        })
    }

    // ── Cross-collection helpers ─────────────────────────────────────

    /// Insert a discovered source, merging with any existing record.
    pub(crate) fn merge_source(&self, discovered: Source) -> bool {
        let key = discovered.name.clone();
        let merged = match self.sources.get(&key) {
            Some(existing) => Source::clone(&existing).merge(discovered),
            None => discovered,
        };
        self.sources.upsert(key, merged)
    }

    /// Drop a source and everything keyed by it.
    pub(crate) fn drop_source(&self, name: &str) -> bool {
        let removed = self.sources.remove(name).is_some();
        let filters = self.filters.remove(name).is_some();
        let media = self.media.remove(name).is_some();
        self.update_counters(|c| {
            c.peaks.remove(name);
        });
        removed || filters || media
    }

    /// Remove sources no scene item or group entry references any more.
    /// Special inputs are never orphans.
    pub(crate) fn prune_orphans(&self) -> bool {
        let mut referenced: HashSet<String> = HashSet::new();
        for list in self.scene_items.snapshot().iter() {
            referenced.extend(list.items.iter().map(|i| i.source_name.clone()));
        }
        for group in self.groups.snapshot().iter() {
            referenced.extend(group.items.iter().map(|i| i.source_name.clone()));
        }
        let orphans: Vec<String> = self
            .sources
            .snapshot()
            .iter()
            .filter(|s| !s.special && !referenced.contains(&s.name))
            .map(|s| s.name.clone())
            .collect();
        let mut changed = false;
        for name in &orphans {
            tracing::debug!(source = %name, "pruning orphaned source");
            changed |= self.drop_source(name);
        }
        changed
    }

    pub fn has_media_sources(&self) -> bool {
        self.sources.snapshot().iter().any(|s| s.is_media())
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn scenes_snapshot(&self) -> Arc<Vec<Arc<Scene>>> {
        self.scenes.snapshot()
    }

    pub fn scene_items_snapshot(&self) -> Arc<Vec<Arc<SceneItems>>> {
        self.scene_items.snapshot()
    }

    pub fn groups_snapshot(&self) -> Arc<Vec<Arc<Group>>> {
        self.groups.snapshot()
    }

    pub fn sources_snapshot(&self) -> Arc<Vec<Arc<Source>>> {
        self.sources.snapshot()
    }

    pub fn filters_snapshot(&self) -> Arc<Vec<Arc<SourceFilters>>> {
        self.filters.snapshot()
    }

    pub fn transitions_snapshot(&self) -> Arc<Vec<Arc<Transition>>> {
        self.transitions.snapshot()
    }

    pub fn outputs_snapshot(&self) -> Arc<Vec<Arc<Output>>> {
        self.outputs.snapshot()
    }

    pub fn media_snapshot(&self) -> Arc<Vec<Arc<MediaStatus>>> {
        self.media.snapshot()
    }

    pub fn session(&self) -> SessionState {
        self.session.borrow().clone()
    }

    pub fn counters(&self) -> Counters {
        self.counters.borrow().clone()
    }

    /// Scene names in remote order (by reported index, then name).
    pub fn scene_names(&self) -> Vec<String> {
        let mut scenes: Vec<Arc<Scene>> = self.scenes.snapshot().iter().cloned().collect();
        scenes.sort_by(|a, b| {
            a.index
                .unwrap_or(i64::MAX)
                .cmp(&b.index.unwrap_or(i64::MAX))
                .then_with(|| a.name.cmp(&b.name))
        });
        scenes.iter().map(|s| s.name.clone()).collect()
    }

    // ── Single-entity lookups ────────────────────────────────────────

    pub fn scene(&self, name: &str) -> Option<Arc<Scene>> {
        self.scenes.get(name)
    }

    pub fn scene_items(&self, scene: &str) -> Option<Arc<SceneItems>> {
        self.scene_items.get(scene)
    }

    pub fn group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.get(name)
    }

    pub fn source(&self, name: &str) -> Option<Arc<Source>> {
        self.sources.get(name)
    }

    pub fn source_filters(&self, source: &str) -> Option<Arc<SourceFilters>> {
        self.filters.get(source)
    }

    pub fn media_status(&self, input: &str) -> Option<Arc<MediaStatus>> {
        self.media.get(input)
    }

    pub fn output(&self, name: &str) -> Option<Arc<Output>> {
        self.outputs.get(name)
    }

    /// Media inputs currently known, by name.
    pub fn media_source_names(&self) -> Vec<String> {
        self.sources
            .snapshot()
            .iter()
            .filter(|s| s.kind == SourceKind::Media)
            .map(|s| s.name.clone())
            .collect()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_scenes(&self) -> EntityStream<Scene> {
        EntityStream::new(self.scenes.subscribe())
    }

    pub fn subscribe_sources(&self) -> EntityStream<Source> {
        EntityStream::new(self.sources.subscribe())
    }

    pub fn subscribe_outputs(&self) -> EntityStream<Output> {
        EntityStream::new(self.outputs.subscribe())
    }

    pub fn subscribe_session(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    pub fn subscribe_counters(&self) -> watch::Receiver<Counters> {
        self.counters.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{SceneItem, SourceKind};

    fn placed(scene: &str, source: &str) -> SceneItems {
        SceneItems {
            scene: scene.into(),
            items: vec![SceneItem {
                id: 1,
                index: 0,
                enabled: true,
                source_name: source.into(),
                source_type: None,
                input_kind: Some("ffmpeg_source".into()),
                is_group: false,
            }],
        }
    }

    #[test]
    fn event_mark_makes_older_ticket_stale_for_that_field_only() {
        let store = StateStore::new();
        let ticket = store.ticket();
        store.mark("Mic", field::MUTE);

        assert!(!store.is_fresh(&ticket, "Mic", field::MUTE));
        assert!(store.is_fresh(&ticket, "Mic", field::VOLUME));
        assert!(store.is_fresh(&ticket, "Camera", field::MUTE));
        assert!(store.is_fresh(&store.ticket(), "Mic", field::MUTE));
    }

    #[test]
    fn generation_bump_invalidates_tickets() {
        let store = StateStore::new();
        let ticket = store.ticket();
        store.reset();
        assert!(!store.is_current(&ticket));
        assert!(!store.is_fresh(&ticket, "Mic", field::MUTE));
    }

    #[test]
    fn moved_marks_follow_rename() {
        let store = StateStore::new();
        let ticket = store.ticket();
        store.mark("Cam", field::ACTIVE);
        store.move_marks("Cam", "Camera");
        assert!(store.is_fresh(&ticket, "Cam", field::ACTIVE));
        assert!(!store.is_fresh(&ticket, "Camera", field::ACTIVE));
    }

    #[test]
    fn prune_keeps_referenced_and_special_sources() {
        let store = StateStore::new();
        store.scene_items.upsert("Main".into(), placed("Main", "Clip"));
        store.sources.upsert("Clip".into(), Source::new("Clip", SourceKind::Media));
        store.sources.upsert("Gone".into(), Source::new("Gone", SourceKind::Other));
        let mut mic = Source::new("Mic/Aux", SourceKind::Audio);
        mic.special = true;
        store.sources.upsert("Mic/Aux".into(), mic);

        assert!(store.prune_orphans());
        let names: Vec<String> = store.sources_snapshot().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, ["Clip", "Mic/Aux"]);
        assert!(store.has_media_sources());
        assert!(!store.prune_orphans());
    }

    #[test]
    fn reset_collection_keeps_profiles() {
        let store = StateStore::new();
        store.update_session(|s| {
            s.profiles.current = Some("Default".into());
            s.program_scene = Some("Main".into());
        });
        store.scenes.upsert(
            "Main".into(),
            Scene {
                name: "Main".into(),
                index: Some(0),
            },
        );

        store.reset_collection();
        let session = store.session();
        assert_eq!(session.profiles.current.as_deref(), Some("Default"));
        assert!(session.program_scene.is_none());
        assert!(store.scenes_snapshot().is_empty());
    }

    #[test]
    fn suspend_flags_session_and_bumps_generation() {
        let store = StateStore::new();
        let generation = store.generation();
        store.suspend();
        assert!(store.is_suspended());
        assert_eq!(store.generation(), generation + 1);
        store.resume();
        assert!(!store.is_suspended());
    }
}
