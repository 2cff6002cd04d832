// ── Generic reactive entity collection ──
//
// Concurrent keyed storage with push-based change notification via
// `watch` channels.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A concurrent, reactive collection for a single entity type.
///
/// Uses `DashMap` for O(1) lookups and a `watch` channel carrying a
/// key-ordered snapshot. Writes that leave a value unchanged do not
/// publish.
pub(crate) struct EntityCollection<T: Clone + PartialEq + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace an entity. Returns `true` if anything changed.
    pub(crate) fn upsert(&self, key: String, entity: T) -> bool {
        let changed = self.put(key, entity);
        if changed {
            self.rebuild_snapshot();
        }
        changed
    }

    /// Mutate an entity in place. Returns `true` if it existed and the
    /// closure actually changed it.
    pub(crate) fn update(&self, key: &str, f: impl FnOnce(&mut T)) -> bool {
        let changed = {
            let Some(mut entry) = self.by_key.get_mut(key) else {
                return false;
            };
            let mut next = T::clone(entry.value());
            f(&mut next);
            if next == **entry.value() {
                false
            } else {
                *entry.value_mut() = Arc::new(next);
                true
            }
        };
        if changed {
            self.rebuild_snapshot();
        }
        changed
    }

    /// Move an entity to a new key, letting `f` rewrite its embedded key.
    /// An existing entity under `new` is replaced. Returns the moved
    /// entity if `old` existed.
    pub(crate) fn rename(&self, old: &str, new: &str, f: impl FnOnce(&mut T)) -> Option<Arc<T>> {
        let (_, entity) = self.by_key.remove(old)?;
        let mut moved = T::clone(&entity);
        f(&mut moved);
        let moved = Arc::new(moved);
        self.by_key.insert(new.to_owned(), Arc::clone(&moved));
        self.rebuild_snapshot();
        Some(moved)
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    /// Keep only the entities for which `keep` returns `true`. Returns
    /// the removed keys.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&str, &T) -> bool) -> Vec<String> {
        let doomed: Vec<String> = self
            .by_key
            .iter()
            .filter(|r| !keep(r.key(), r.value()))
            .map(|r| r.key().clone())
            .collect();
        for key in &doomed {
            self.by_key.remove(key);
        }
        if !doomed.is_empty() {
            self.rebuild_snapshot();
        }
        doomed
    }

    /// Upsert all incoming entities, then prune any existing keys not in
    /// the incoming set. Avoids the brief empty state a clear would cause.
    /// Returns `true` if anything changed.
    pub(crate) fn replace_all(&self, items: Vec<(String, T)>) -> bool {
        let incoming: HashSet<String> = items.iter().map(|(k, _)| k.clone()).collect();
        let mut changed = false;
        for (key, entity) in items {
            changed |= self.put(key, entity);
        }
        let before = self.by_key.len();
        self.by_key.retain(|k, _| incoming.contains(k));
        changed |= self.by_key.len() != before;
        if changed {
            self.rebuild_snapshot();
        }
        changed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Get the current snapshot (cheap `Arc` clone), ordered by key.
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn clear(&self) {
        if !self.by_key.is_empty() {
            self.by_key.clear();
            self.rebuild_snapshot();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.by_key.iter().map(|r| r.key().clone()).collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn put(&self, key: String, entity: T) -> bool {
        if self.by_key.get(&key).is_some_and(|cur| **cur == entity) {
            return false;
        }
        self.by_key.insert(key, Arc::new(entity));
        true
    }

    fn rebuild_snapshot(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_change_only_when_value_differs() {
        let col: EntityCollection<String> = EntityCollection::new();
        assert!(col.upsert("a".into(), "x".into()));
        assert!(!col.upsert("a".into(), "x".into()));
        assert!(col.upsert("a".into(), "y".into()));
    }

    #[test]
    fn snapshot_is_ordered_by_key() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert("main".into(), "Main".into());
        col.upsert("intro".into(), "Intro".into());
        col.upsert("outro".into(), "Outro".into());

        let snap: Vec<String> = col.snapshot().iter().map(|s| (**s).clone()).collect();
        assert_eq!(snap, ["Intro", "Main", "Outro"]);
    }

    #[test]
    fn update_without_change_does_not_publish() {
        let col: EntityCollection<u32> = EntityCollection::new();
        col.upsert("a".into(), 1);
        let rx = col.subscribe();
        assert!(!col.update("a", |v| *v = 1));
        assert!(!rx.has_changed().unwrap());
        assert!(col.update("a", |v| *v = 2));
        assert!(rx.has_changed().unwrap());
        assert!(!col.update("missing", |v| *v = 3));
    }

    #[test]
    fn rename_moves_value() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert("old".into(), "payload".into());
        let moved = col.rename("old", "new", |v| v.push('!')).unwrap();
        assert_eq!(*moved, "payload!");
        assert!(col.get("old").is_none());
        assert_eq!(*col.get("new").unwrap(), "payload!");
        assert!(col.rename("old", "again", |_| {}).is_none());
    }

    #[test]
    fn replace_all_prunes_missing_keys() {
        let col: EntityCollection<u32> = EntityCollection::new();
        col.upsert("a".into(), 1);
        col.upsert("b".into(), 2);

        assert!(col.replace_all(vec![("b".into(), 2), ("c".into(), 3)]));
        let mut keys = col.keys();
        keys.sort();
        assert_eq!(keys, ["b", "c"]);

        assert!(!col.replace_all(vec![("b".into(), 2), ("c".into(), 3)]));
    }

    #[test]
    fn retain_returns_removed_keys() {
        let col: EntityCollection<u32> = EntityCollection::new();
        col.upsert("a".into(), 1);
        col.upsert("b".into(), 2);
        let removed = col.retain(|_, v| *v > 1);
        assert_eq!(removed, ["a"]);
        assert_eq!(col.len(), 1);

        col.clear();
        assert!(col.is_empty());
        assert!(col.snapshot().is_empty());
    }
}
