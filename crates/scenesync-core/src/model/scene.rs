// ── Scene domain types ──

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    /// Position reported by the remote scene list. `None` until the
    /// first full list arrives for a scene created by an event.
    pub index: Option<i64>,
}

/// One placement of a source inside a scene or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneItem {
    /// Unique within the owning scene only.
    pub id: i64,
    pub index: i64,
    pub enabled: bool,
    pub source_name: String,
    pub source_type: Option<String>,
    pub input_kind: Option<String>,
    pub is_group: bool,
}

/// Ordered item list of a (non-group) scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneItems {
    pub scene: String,
    pub items: Vec<SceneItem>,
}

/// A group: a scene-like container whose items never appear in
/// [`SceneItems`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub items: Vec<SceneItem>,
}

/// Shared operations over an ordered item list.
pub(crate) trait ItemList {
    fn items(&self) -> &[SceneItem];
    fn items_mut(&mut self) -> &mut Vec<SceneItem>;

    fn references(&self, source: &str) -> bool {
        self.items().iter().any(|i| i.source_name == source)
    }

    fn item_mut(&mut self, id: i64) -> Option<&mut SceneItem> {
        self.items_mut().iter_mut().find(|i| i.id == id)
    }

    /// Remove one item. Returns the source it placed.
    fn remove_item(&mut self, id: i64) -> Option<String> {
        let items = self.items_mut();
        let pos = items.iter().position(|i| i.id == id)?;
        Some(items.remove(pos).source_name)
    }

    fn rename_source(&mut self, old: &str, new: &str) {
        for item in self.items_mut() {
            if item.source_name == old {
                new.clone_into(&mut item.source_name);
            }
        }
    }

    /// Apply a reindex: `order` lists `(item id, new index)`. Items the
    /// remote did not mention keep their index.
    fn reindex(&mut self, order: &[(i64, i64)]) {
        let items = self.items_mut();
        for (id, index) in order {
            if let Some(item) = items.iter_mut().find(|i| i.id == *id) {
                item.index = *index;
            }
        }
        items.sort_by_key(|i| i.index);
    }
}

impl ItemList for SceneItems {
    fn items(&self) -> &[SceneItem] {
        &self.items
    }
    fn items_mut(&mut self) -> &mut Vec<SceneItem> {
        &mut self.items
    }
}

impl ItemList for Group {
    fn items(&self) -> &[SceneItem] {
        &self.items
    }
    fn items_mut(&mut self) -> &mut Vec<SceneItem> {
        &mut self.items
    }
}
