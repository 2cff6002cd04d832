// ── Scene, scene item and group builders ──

use std::collections::HashSet;

use serde_json::json;
use tracing::debug;

use scenesync_api::responses::{
    CurrentPreviewScene, FilterList, InputSettings, SceneItemList, SceneList, SourceActive,
};
use scenesync_api::{BatchRequest, BatchResponse, Session};

use super::{BuildContext, accepts, item, stale};
use crate::convert;
use crate::error::CoreError;
use crate::model::{Group, Scene, SceneItem, SceneItems, SourceFilters};
use crate::reconcile::{FollowUp, Reaction};
use crate::store::{ChangeSet, StateStore, Ticket, field};

/// `GetSceneList`: the authoritative scene set plus program/preview.
/// Every listed scene gets a source-list follow-up.
pub(crate) async fn scene_list<S: Session>(ctx: &BuildContext<S>) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let list: SceneList = ctx.call("GetSceneList", None).await?;

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !accepts(store, &ticket) {
        return stale("GetSceneList");
    }

    let mut reaction = Reaction::default();
    let incoming: HashSet<String> = list.scenes.iter().map(|s| s.scene_name.clone()).collect();

    for entry in list.scenes {
        let name = entry.scene_name.clone();
        // Removed by an event after the request went out.
        if !store.scenes.contains(&name) && !store.is_fresh(&ticket, &name, field::EXISTS) {
            continue;
        }
        if store.scenes.upsert(name.clone(), Scene::from(entry)) {
            reaction.changes |= ChangeSet::SCENES;
        }
        reaction
            .follow_ups
            .push(FollowUp::RebuildSourceList { scene: name });
    }

    let removed = store.scenes.retain(|name, _| {
        incoming.contains(name) || !store.is_fresh(&ticket, name, field::EXISTS)
    });
    for name in &removed {
        store.scene_items.remove(name);
        reaction.changes |= ChangeSet::SCENES | ChangeSet::SCENE_ITEMS;
    }
    if store.prune_orphans() {
        reaction.changes |= ChangeSet::SOURCES | ChangeSet::FILTERS | ChangeSet::MEDIA;
    }

    let program_fresh = store.is_fresh(&ticket, field::SESSION, field::PROGRAM);
    let preview_fresh = store.is_fresh(&ticket, field::SESSION, field::PREVIEW);
    let changed = store.update_session(|s| {
        if program_fresh && list.current_program_scene_name.is_some() {
            s.program_scene = list.current_program_scene_name;
        }
        if preview_fresh && list.current_preview_scene_name.is_some() {
            s.preview_scene = list.current_preview_scene_name;
        }
    });
    if changed {
        reaction.changes |= ChangeSet::PROGRAM;
    }
    Ok(reaction)
}

/// `GetSceneItemList` for one scene, then its per-source detail batch.
pub(crate) async fn source_list<S: Session>(
    ctx: &BuildContext<S>,
    scene: &str,
) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let list: SceneItemList = ctx
        .call("GetSceneItemList", Some(json!({ "sceneName": scene })))
        .await?;
    let items: Vec<SceneItem> = list.scene_items.into_iter().map(SceneItem::from).collect();

    let (mut reaction, placed) = {
        let store = &ctx.store;
        let _guard = store.lock_structure();
        if !accepts(store, &ticket) {
            return stale("GetSceneItemList");
        }
        if !store.scenes.contains(scene) {
            debug!(scene, "scene vanished before its items arrived");
            return Ok(Reaction::default());
        }

        let (mut reaction, placed) = place_items(store, &ticket, None, items);
        if store.is_fresh(&ticket, scene, field::ITEMS) {
            let list = SceneItems {
                scene: scene.to_owned(),
                items: placed.clone(),
            };
            if store.scene_items.upsert(scene.to_owned(), list) {
                reaction.changes |= ChangeSet::SCENE_ITEMS;
            }
            if store.prune_orphans() {
                reaction.changes |= ChangeSet::SOURCES | ChangeSet::FILTERS | ChangeSet::MEDIA;
            }
        }
        (reaction, placed)
    };

    reaction.changes |= source_details(ctx, &placed).await?;
    Ok(reaction)
}

/// `GetGroupSceneItemList` for one group. Group entries live only in the
/// group index; their sources remember the owning group.
pub(crate) async fn group<S: Session>(
    ctx: &BuildContext<S>,
    name: &str,
) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let list: SceneItemList = ctx
        .call("GetGroupSceneItemList", Some(json!({ "sceneName": name })))
        .await?;
    let items: Vec<SceneItem> = list.scene_items.into_iter().map(SceneItem::from).collect();

    let (mut reaction, placed) = {
        let store = &ctx.store;
        let _guard = store.lock_structure();
        if !accepts(store, &ticket) {
            return stale("GetGroupSceneItemList");
        }
        if !store.groups.contains(name) && !store.is_fresh(&ticket, name, field::EXISTS) {
            debug!(group = name, "group removed before its items arrived");
            return Ok(Reaction::default());
        }

        let (mut reaction, placed) = place_items(store, &ticket, Some(name), items);
        if store.is_fresh(&ticket, name, field::ITEMS) {
            let group = Group {
                name: name.to_owned(),
                items: placed.clone(),
            };
            if store.groups.upsert(name.to_owned(), group) {
                reaction.changes |= ChangeSet::GROUPS;
            }
            if store.prune_orphans() {
                reaction.changes |= ChangeSet::SOURCES | ChangeSet::FILTERS | ChangeSet::MEDIA;
            }
        }
        (reaction, placed)
    };

    reaction.changes |= source_details(ctx, &placed).await?;
    Ok(reaction)
}

/// `GetCurrentPreviewScene`. Rejected outside studio mode, which is not
/// an error here.
pub(crate) async fn preview_scene<S: Session>(ctx: &BuildContext<S>) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let preview: CurrentPreviewScene = match ctx.call("GetCurrentPreviewScene", None).await {
        Ok(preview) => preview,
        Err(e) if e.is_capability_absent() => {
            debug!(error = %e, "no preview scene");
            return Ok(Reaction::default());
        }
        Err(e) => return Err(e),
    };

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !store.is_current(&ticket) || !store.is_fresh(&ticket, field::SESSION, field::PREVIEW) {
        return stale("GetCurrentPreviewScene");
    }
    let changed = store.update_session(|s| s.preview_scene = preview.scene_name);
    Ok(Reaction::when(changed, ChangeSet::PROGRAM))
}

// ── Shared steps ────────────────────────────────────────────────────

/// Insert the sources a fresh item list references, before the list
/// itself is published. Items whose source an event removed since the
/// request went out are dropped. Returns follow-ups for nested groups
/// and newly discovered inputs, plus the items to publish.
fn place_items(
    store: &StateStore,
    ticket: &Ticket,
    group: Option<&str>,
    items: Vec<SceneItem>,
) -> (Reaction, Vec<SceneItem>) {
    let mut reaction = Reaction::default();
    let mut placed = Vec::with_capacity(items.len());

    for item in items {
        let name = item.source_name.as_str();
        let known = store.sources.contains(name);
        if !known && !store.is_fresh(ticket, name, field::EXISTS) {
            debug!(source = name, "skipping item for removed source");
            continue;
        }
        if store.merge_source(convert::source_from_item(&item, group)) {
            reaction.changes |= ChangeSet::SOURCES;
        }
        if item.is_group {
            reaction.follow_ups.push(FollowUp::RebuildGroup {
                group: item.source_name.clone(),
            });
        } else if !known && item.input_kind.is_some() {
            reaction.follow_ups.push(FollowUp::ProbeAudio {
                source: item.source_name.clone(),
            });
        }
        placed.push(item);
    }
    (reaction, placed)
}

/// One batch per item list: activity, filters and (inputs only)
/// settings, keyed by source name.
async fn source_details<S: Session>(
    ctx: &BuildContext<S>,
    items: &[SceneItem],
) -> Result<ChangeSet, CoreError> {
    let mut seen = HashSet::new();
    let mut requests = Vec::new();
    for item in items {
        let name = item.source_name.as_str();
        if !seen.insert(name) {
            continue;
        }
        let source = json!({ "sourceName": name });
        requests.push(BatchRequest::new(name, "GetSourceActive").with_data(source.clone()));
        requests.push(BatchRequest::new(name, "GetSourceFilterList").with_data(source));
        if item.input_kind.is_some() {
            requests.push(
                BatchRequest::new(name, "GetInputSettings")
                    .with_data(json!({ "inputName": name })),
            );
        }
    }

    let ticket = ctx.store.ticket();
    let responses = ctx.batch(requests).await?;

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !accepts(store, &ticket) {
        debug!("discarding stale source details");
        return Ok(ChangeSet::empty());
    }
    Ok(apply_details(store, &ticket, responses))
}

pub(crate) fn apply_details(
    store: &StateStore,
    ticket: &Ticket,
    responses: Vec<BatchResponse>,
) -> ChangeSet {
    let mut changes = ChangeSet::empty();
    for response in responses {
        let name = response.request_id.clone();
        let request_type = response.request_type.clone();
        match request_type.as_str() {
            "GetSourceActive" => {
                let Some(active) = item::<SourceActive>(response) else {
                    continue;
                };
                if store.is_fresh(ticket, &name, field::ACTIVE)
                    && store.sources.update(&name, |s| {
                        s.active = active.video_active;
                        s.video_showing = active.video_showing;
                    })
                {
                    changes |= ChangeSet::SOURCES;
                }
            }
            "GetSourceFilterList" => {
                let Some(list) = item::<FilterList>(response) else {
                    continue;
                };
                if !store.is_fresh(ticket, &name, field::FILTERS) || !store.sources.contains(&name) {
                    continue;
                }
                let filters = convert::filters(list);
                let changed = if filters.is_empty() {
                    store.filters.remove(&name).is_some()
                } else {
                    store.filters.upsert(
                        name.clone(),
                        SourceFilters {
                            source: name.clone(),
                            filters,
                        },
                    )
                };
                if changed {
                    changes |= ChangeSet::FILTERS;
                }
            }
            "GetInputSettings" => {
                let Some(settings) = item::<InputSettings>(response) else {
                    continue;
                };
                if store.is_fresh(ticket, &name, field::SETTINGS)
                    && store
                        .sources
                        .update(&name, |s| s.settings = Some(settings.input_settings))
                {
                    changes |= ChangeSet::SOURCES;
                }
            }
            other => debug!(request_type = other, "unexpected batch item"),
        }
    }
    changes
}
