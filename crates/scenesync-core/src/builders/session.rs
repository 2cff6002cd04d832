// ── Session-wide builders ──
//
// Profiles, collections, transitions, remote info, outputs and the
// downstream-keyer plugin. None of these belong to a scene collection,
// so they only check the generation, not the suspend flag.

use std::collections::HashMap;

use serde_json::{Value, json};
use tracing::debug;

use scenesync_api::responses::{
    CurrentTransition, HotkeyList, MonitorList, OutputEntry, OutputList, OutputStatus,
    ProfileList, SceneCollectionList, StudioModeEnabled, TransitionList, VendorResponse, Version,
    VideoSettings as WireVideo,
};
use scenesync_api::{BatchRequest, Session};

use super::{BuildContext, item, stale};
use crate::convert;
use crate::error::CoreError;
use crate::model::{Monitor, RecordState, RemoteInfo, SessionState, Transition, VideoSettings};
use crate::reconcile::{DSK_VENDOR, FollowUp, Reaction};
use crate::store::{ChangeSet, StateStore, Ticket, field};

pub(crate) async fn profiles<S: Session>(ctx: &BuildContext<S>) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let list: ProfileList = ctx.call("GetProfileList", None).await?;

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !store.is_current(&ticket) {
        return stale("GetProfileList");
    }
    let current_fresh = store.is_fresh(&ticket, field::SESSION, field::PROFILE);
    let changed = store.update_session(|s| {
        s.profiles.names = list.profiles;
        if current_fresh {
            s.profiles.current = list.current_profile_name;
        }
    });
    Ok(Reaction::when(changed, ChangeSet::PROFILES))
}

pub(crate) async fn scene_collections<S: Session>(
    ctx: &BuildContext<S>,
) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let list: SceneCollectionList = ctx.call("GetSceneCollectionList", None).await?;

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !store.is_current(&ticket) {
        return stale("GetSceneCollectionList");
    }
    let current_fresh = store.is_fresh(&ticket, field::SESSION, field::COLLECTION);
    let changed = store.update_session(|s| {
        s.scene_collections.names = list.scene_collections;
        if current_fresh {
            s.scene_collections.current = list.current_scene_collection_name;
        }
    });
    Ok(Reaction::when(changed, ChangeSet::COLLECTIONS))
}

pub(crate) async fn transitions<S: Session>(ctx: &BuildContext<S>) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let list: TransitionList = ctx.call("GetSceneTransitionList", None).await?;

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !store.is_current(&ticket) {
        return stale("GetSceneTransitionList");
    }
    let mut changed = store.transitions.replace_all(
        list.transitions
            .into_iter()
            .map(|t| (t.transition_name.clone(), Transition::from(t)))
            .collect(),
    );
    if store.is_fresh(&ticket, field::SESSION, field::TRANSITION) {
        changed |= store.update_session(|s| {
            s.transition.current = list.current_scene_transition_name;
        });
    }
    Ok(Reaction::when(changed, ChangeSet::TRANSITIONS))
}

/// `GetCurrentSceneTransition`: name plus duration, which the change
/// event does not carry.
pub(crate) async fn current_transition<S: Session>(
    ctx: &BuildContext<S>,
) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let current: CurrentTransition = ctx.call("GetCurrentSceneTransition", None).await?;

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !store.is_current(&ticket) {
        return stale("GetCurrentSceneTransition");
    }
    let name_fresh = store.is_fresh(&ticket, field::SESSION, field::TRANSITION);
    let duration_fresh = store.is_fresh(&ticket, field::SESSION, field::TRANSITION_DURATION);
    let changed = store.update_session(|s| {
        if name_fresh && current.transition_name.is_some() {
            s.transition.current = current.transition_name;
        }
        if duration_fresh && current.transition_duration.is_some() {
            s.transition.duration_ms = current.transition_duration;
        }
    });
    Ok(Reaction::when(changed, ChangeSet::TRANSITIONS))
}

// ── Remote info ─────────────────────────────────────────────────────

const REMOTE_INFO_REQUESTS: [&str; 8] = [
    "GetVersion",
    "GetStudioModeEnabled",
    "GetHotkeyList",
    "GetMonitorList",
    "GetVideoSettings",
    "GetReplayBufferStatus",
    "GetStreamStatus",
    "GetRecordStatus",
];

/// Version, studio mode, hotkeys, monitors, video settings and output
/// singletons in one batch, then the generic output list.
pub(crate) async fn remote_info<S: Session>(ctx: &BuildContext<S>) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let requests = REMOTE_INFO_REQUESTS
        .iter()
        .map(|request_type| BatchRequest::new(*request_type, *request_type))
        .collect();
    let responses = ctx.batch(requests).await?;

    let mut reaction = {
        let store = &ctx.store;
        let _guard = store.lock_structure();
        if !store.is_current(&ticket) {
            return stale("remote info");
        }

        let mut reaction = Reaction::default();
        let mut studio_mode_on = false;
        let mut stream = None;
        let mut record = None;
        let mut replay = None;
        let mut changes = ChangeSet::empty();
        let studio_fresh = store.is_fresh(&ticket, field::SESSION, field::STUDIO_MODE);

        let changed = store.update_session(|s| {
            for response in responses {
                let request_type = response.request_type.clone();
                match request_type.as_str() {
                    "GetVersion" => {
                        if let Some(version) = item::<Version>(response) {
                            s.remote = Some(RemoteInfo::from(version));
                        }
                    }
                    "GetStudioModeEnabled" => {
                        if let Some(mode) = item::<StudioModeEnabled>(response) {
                            if studio_fresh {
                                s.studio_mode = mode.studio_mode_enabled;
                            }
                            studio_mode_on = s.studio_mode;
                        }
                    }
                    "GetHotkeyList" => {
                        if let Some(list) = item::<HotkeyList>(response) {
                            s.hotkeys = list.hotkeys;
                        }
                    }
                    "GetMonitorList" => {
                        if let Some(list) = item::<MonitorList>(response) {
                            s.monitors = list.monitors.into_iter().map(Monitor::from).collect();
                        }
                    }
                    "GetVideoSettings" => {
                        if let Some(video) = item::<WireVideo>(response) {
                            s.video = Some(VideoSettings::from(video));
                        }
                    }
                    "GetReplayBufferStatus" => replay = item::<OutputStatus>(response),
                    "GetStreamStatus" => stream = item::<OutputStatus>(response),
                    "GetRecordStatus" => record = item::<OutputStatus>(response),
                    other => debug!(request_type = other, "unexpected batch item"),
                }
            }
        });
        if changed {
            changes |= ChangeSet::REMOTE;
        }
        if let Some(status) = replay {
            if store.is_fresh(&ticket, field::SESSION, field::REPLAY)
                && store.update_session(|s| s.replay_buffer.active = status.output_active)
            {
                changes |= ChangeSet::OUTPUTS;
            }
        }
        if let Some(status) = stream {
            if apply_stream_status(store, &ticket, &status, None, None) {
                changes |= ChangeSet::OUTPUTS;
            }
        }
        if let Some(status) = record {
            if apply_record_status(store, &ticket, &status) {
                changes |= ChangeSet::OUTPUTS;
            }
        }
        reaction.changes = changes;
        if studio_mode_on {
            reaction.follow_ups.push(FollowUp::FetchPreviewScene);
        }
        reaction
    };

    reaction.merge(outputs(ctx).await?);
    Ok(reaction)
}

/// Fold a `GetStreamStatus` answer into the stream singleton. The
/// active flag is left alone when an event wrote it later.
pub(crate) fn apply_stream_status(
    store: &StateStore,
    ticket: &Ticket,
    status: &OutputStatus,
    kbits_per_sec: Option<u64>,
    service: Option<Option<String>>,
) -> bool {
    let active_fresh = store.is_fresh(ticket, field::SESSION, field::STREAM);
    store.update_session(|s| {
        let stream = &mut s.stream;
        if active_fresh {
            stream.active = status.output_active;
        }
        stream.reconnecting = status.output_reconnecting;
        stream.timecode = status.output_timecode.as_deref().map(convert::short_timecode);
        stream.bytes = status.output_bytes;
        stream.congestion = status.output_congestion;
        stream.skipped_frames = status.output_skipped_frames;
        stream.total_frames = status.output_total_frames;
        if let Some(kbits) = kbits_per_sec {
            stream.kbits_per_sec = kbits;
        }
        if let Some(service) = service {
            stream.service = service;
        }
        if !stream.active {
            stream.kbits_per_sec = 0;
        }
    })
}

/// Fold a `GetRecordStatus` answer into the record singleton.
pub(crate) fn apply_record_status(store: &StateStore, ticket: &Ticket, status: &OutputStatus) -> bool {
    let state_fresh = store.is_fresh(ticket, field::SESSION, field::RECORD);
    store.update_session(|s: &mut SessionState| {
        let record = &mut s.record;
        if state_fresh {
            record.state = RecordState::from_flags(status.output_active, status.output_paused);
        }
        record.timecode = if record.state == RecordState::Stopped {
            None
        } else {
            status.output_timecode.as_deref().map(convert::short_timecode)
        };
        record.bytes = status.output_bytes;
    })
}

// ── Outputs ─────────────────────────────────────────────────────────

/// `GetOutputList`, then `GetOutputStatus` per output in one batch.
pub(crate) async fn outputs<S: Session>(ctx: &BuildContext<S>) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let list: OutputList = ctx.call("GetOutputList", None).await?;
    let requests = list
        .outputs
        .iter()
        .map(|o| {
            BatchRequest::new(o.output_name.as_str(), "GetOutputStatus")
                .with_data(json!({ "outputName": o.output_name }))
        })
        .collect();
    let responses = ctx.batch(requests).await?;

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !store.is_current(&ticket) {
        return stale("GetOutputList");
    }

    let mut statuses: HashMap<String, OutputStatus> = responses
        .into_iter()
        .filter_map(|r| {
            let name = r.request_id.clone();
            item::<OutputStatus>(r).map(|status| (name, status))
        })
        .collect();

    let outputs = list
        .outputs
        .iter()
        .map(|entry| {
            let status = statuses
                .remove(&entry.output_name)
                .unwrap_or_else(|| OutputStatus {
                    output_active: entry.output_active,
                    ..OutputStatus::default()
                });
            let mut output = convert::output(entry, &status);
            if !store.is_fresh(&ticket, &output.name, field::OUTPUT) {
                if let Some(existing) = store.outputs.get(&output.name) {
                    output.active = existing.active;
                }
            }
            (output.name.clone(), output)
        })
        .collect();
    let changed = store.outputs.replace_all(outputs);
    Ok(Reaction::when(changed, ChangeSet::OUTPUTS))
}

/// Status refresh for the outputs already known, without relisting.
pub(crate) async fn output_status<S: Session>(ctx: &BuildContext<S>) -> Result<ChangeSet, CoreError> {
    let names = ctx.store.outputs.keys();
    if names.is_empty() {
        return Ok(ChangeSet::empty());
    }
    let ticket = ctx.store.ticket();
    let requests = names
        .iter()
        .map(|name| {
            BatchRequest::new(name.as_str(), "GetOutputStatus")
                .with_data(json!({ "outputName": name }))
        })
        .collect();
    let responses = ctx.batch(requests).await?;

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !store.is_current(&ticket) {
        return Ok(ChangeSet::empty());
    }
    let mut changes = ChangeSet::empty();
    for response in responses {
        let name = response.request_id.clone();
        let Some(status) = item::<OutputStatus>(response) else {
            continue;
        };
        let active_fresh = store.is_fresh(&ticket, &name, field::OUTPUT);
        let changed = store.outputs.update(&name, |o| {
            let active = o.active;
            let entry = OutputEntry {
                output_name: o.name.clone(),
                output_kind: o.kind.clone(),
                output_active: active,
            };
            *o = convert::output(&entry, &status);
            if !active_fresh {
                o.active = active;
            }
        });
        if changed {
            changes |= ChangeSet::OUTPUTS;
        }
    }
    Ok(changes)
}

// ── Downstream keyer ────────────────────────────────────────────────

async fn vendor_request<S: Session>(
    ctx: &BuildContext<S>,
    request_type: &str,
    data: Value,
) -> Result<Value, CoreError> {
    let response: VendorResponse = ctx
        .call(
            "CallVendorRequest",
            Some(json!({
                "vendorName": DSK_VENDOR,
                "requestType": request_type,
                "requestData": data,
            })),
        )
        .await?;
    Ok(response.response_data)
}

fn succeeded(data: &Value) -> bool {
    data.get("success").and_then(Value::as_bool).unwrap_or(false)
}

/// Tab count of the downstream-keyer plugin; only tab 0's items are
/// fetched here, the rest on demand.
pub(crate) async fn dsk_tabs<S: Session>(ctx: &BuildContext<S>) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let data = match vendor_request(ctx, "get_dsk_tabs", json!({})).await {
        Ok(data) => data,
        Err(e) if e.is_capability_absent() => {
            debug!(error = %e, "downstream keyer not available");
            Value::Null
        }
        Err(e) => return Err(e),
    };
    let tab_count = if succeeded(&data) {
        data.get("tabCount")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    } else {
        0
    };

    let changed = {
        let store = &ctx.store;
        let _guard = store.lock_structure();
        if !store.is_current(&ticket) {
            return stale("get_dsk_tabs");
        }
        store.update_session(|s| {
            s.dsk.tab_count = tab_count;
            s.dsk.items.retain(|tab, _| *tab < tab_count);
        })
    };

    let mut reaction = Reaction::when(changed, ChangeSet::DSK);
    if tab_count > 0 {
        let before = ctx.store.session().dsk;
        dsk_items(ctx, 0).await?;
        if ctx.store.session().dsk != before {
            reaction.changes |= ChangeSet::DSK;
        }
    }
    Ok(reaction)
}

/// Scene names placed in one downstream-keyer tab (zero-based),
/// deduplicated in plugin order. Also cached on the session.
pub(crate) async fn dsk_items<S: Session>(
    ctx: &BuildContext<S>,
    tab: u32,
) -> Result<Vec<String>, CoreError> {
    let ticket = ctx.store.ticket();
    let data = vendor_request(ctx, "get_dsk_items_in_tab", json!({ "dskTabIdx": tab })).await?;

    let mut scenes: Vec<String> = Vec::new();
    if succeeded(&data) {
        let entries = data.get("dskData").and_then(Value::as_array);
        for entry in entries.into_iter().flatten() {
            if let Some(name) = entry.get("sceneName").and_then(Value::as_str) {
                if !scenes.iter().any(|s| s == name) {
                    scenes.push(name.to_owned());
                }
            }
        }
    }

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if store.is_current(&ticket) {
        store.update_session(|s| {
            s.dsk.items.insert(tab, scenes.clone());
        });
    }
    Ok(scenes)
}
