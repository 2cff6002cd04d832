// ── Source-level builders: special inputs, audio probe, filters ──

use std::collections::HashSet;

use serde_json::json;
use tracing::{debug, trace, warn};

use scenesync_api::responses::{
    FilterList, InputAudioBalance, InputAudioMonitorType, InputAudioSyncOffset,
    InputAudioTracks, InputMute, InputVolume, SpecialInputs,
};
use scenesync_api::{BatchRequest, BatchResponse, Session};

use super::{BuildContext, accepts, item, stale};
use crate::convert;
use crate::error::CoreError;
use crate::model::{AudioState, MonitorType, Source, SourceFilters, SourceKind};
use crate::reconcile::{FollowUp, Reaction};
use crate::store::{ChangeSet, StateStore, Ticket, field};

/// Per-field audio requests issued once a probe succeeded.
const AUDIO_REQUESTS: [&str; 5] = [
    "GetInputMute",
    "GetInputVolume",
    "GetInputAudioBalance",
    "GetInputAudioSyncOffset",
    "GetInputAudioMonitorType",
];

/// `GetSpecialInputs`: desktop and mic slots. Their inputs are tracked
/// even when no scene places them.
pub(crate) async fn special_inputs<S: Session>(
    ctx: &BuildContext<S>,
) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let special: SpecialInputs = ctx.call("GetSpecialInputs", None).await?;
    let names: HashSet<String> = special.into_values().flatten().collect();

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !accepts(store, &ticket) {
        return stale("GetSpecialInputs");
    }

    let mut reaction = Reaction::default();
    for name in &names {
        let known = store.sources.contains(name);
        if !known && !store.is_fresh(&ticket, name, field::EXISTS) {
            continue;
        }
        let mut source = match store.sources.get(name) {
            Some(existing) => Source::clone(&existing),
            None => Source::new(name.clone(), SourceKind::Audio),
        };
        source.special = true;
        if store.merge_source(source) {
            reaction.changes |= ChangeSet::SOURCES;
        }
        if !known {
            reaction.follow_ups.push(FollowUp::ProbeAudio {
                source: name.clone(),
            });
        }
    }

    // Slots emptied since the last build.
    for source in store.sources_snapshot().iter() {
        if source.special && !names.contains(&source.name) {
            store.sources.update(&source.name, |s| s.special = false);
            reaction.changes |= ChangeSet::SOURCES;
        }
    }
    if store.prune_orphans() {
        reaction.changes |= ChangeSet::SOURCES | ChangeSet::FILTERS | ChangeSet::MEDIA;
    }
    Ok(reaction)
}

/// Find out whether `source` carries audio. Rejections meaning "no audio
/// here" are expected and stay quiet; a positive answer is followed by
/// one batch for the remaining audio fields.
pub(crate) async fn probe_audio<S: Session>(
    ctx: &BuildContext<S>,
    source: &str,
) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let input = json!({ "inputName": source });

    let tracks: InputAudioTracks = match ctx
        .call("GetInputAudioTracks", Some(input.clone()))
        .await
    {
        Ok(tracks) => tracks,
        Err(e) if e.is_capability_absent() => {
            trace!(source, "no audio capability");
            return Ok(Reaction::default());
        }
        Err(e) if e.is_not_connected() => return Err(e),
        Err(e) => {
            warn!(source, error = %e, "audio probe failed");
            return Ok(Reaction::default());
        }
    };

    let requests = AUDIO_REQUESTS
        .iter()
        .map(|request_type| BatchRequest::new(source, *request_type).with_data(input.clone()))
        .collect();
    let responses = ctx.batch(requests).await?;

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !accepts(store, &ticket) {
        return stale("GetInputAudioTracks");
    }
    let changed = apply_audio(store, &ticket, source, tracks, responses);
    Ok(Reaction::when(changed, ChangeSet::AUDIO))
}

fn apply_audio(
    store: &StateStore,
    ticket: &Ticket,
    source: &str,
    tracks: InputAudioTracks,
    responses: Vec<BatchResponse>,
) -> bool {
    let fresh = |audio_field: &'static str| store.is_fresh(ticket, source, audio_field);
    store.sources.update(source, |s| {
        let audio = s.audio.get_or_insert_with(AudioState::default);
        if fresh(field::TRACKS) {
            audio.tracks = tracks.input_audio_tracks;
        }
        for response in responses {
            let request_type = response.request_type.clone();
            match request_type.as_str() {
                "GetInputMute" => {
                    if let Some(mute) = item::<InputMute>(response) {
                        if fresh(field::MUTE) {
                            audio.muted = mute.input_muted;
                        }
                    }
                }
                "GetInputVolume" => {
                    if let Some(volume) = item::<InputVolume>(response) {
                        if fresh(field::VOLUME) {
                            audio.volume_db = volume.input_volume_db;
                            audio.volume_mul = volume.input_volume_mul;
                        }
                    }
                }
                "GetInputAudioBalance" => {
                    if let Some(balance) = item::<InputAudioBalance>(response) {
                        if fresh(field::BALANCE) {
                            audio.balance = balance.input_audio_balance;
                        }
                    }
                }
                "GetInputAudioSyncOffset" => {
                    if let Some(offset) = item::<InputAudioSyncOffset>(response) {
                        if fresh(field::SYNC_OFFSET) {
                            audio.sync_offset_ms = offset.input_audio_sync_offset;
                        }
                    }
                }
                "GetInputAudioMonitorType" => {
                    if let Some(monitor) = item::<InputAudioMonitorType>(response) {
                        if fresh(field::MONITOR_TYPE) {
                            audio.monitor_type = MonitorType::from_wire(&monitor.monitor_type);
                        }
                    }
                }
                other => debug!(request_type = other, "unexpected batch item"),
            }
        }
    })
}

/// `GetSourceFilterList` for one source.
pub(crate) async fn filters<S: Session>(
    ctx: &BuildContext<S>,
    source: &str,
) -> Result<Reaction, CoreError> {
    let ticket = ctx.store.ticket();
    let list: FilterList = ctx
        .call("GetSourceFilterList", Some(json!({ "sourceName": source })))
        .await?;

    let store = &ctx.store;
    let _guard = store.lock_structure();
    if !accepts(store, &ticket) || !store.is_fresh(&ticket, source, field::FILTERS) {
        return stale("GetSourceFilterList");
    }
    if !store.sources.contains(source) {
        debug!(source, "filters for untracked source");
        return Ok(Reaction::default());
    }

    let filters = convert::filters(list);
    let changed = if filters.is_empty() {
        store.filters.remove(source).is_some()
    } else {
        store.filters.upsert(
            source.to_owned(),
            SourceFilters {
                source: source.to_owned(),
                filters,
            },
        )
    };
    Ok(Reaction::when(changed, ChangeSet::FILTERS))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::builders::testing::ScriptedSession;

    fn audio_session() -> Arc<ScriptedSession> {
        let session = Arc::new(ScriptedSession::default());
        session
            .respond(
                "GetInputAudioTracks",
                json!({ "inputAudioTracks": { "1": true, "2": false } }),
            )
            .respond("GetInputMute", json!({ "inputMuted": true }))
            .respond(
                "GetInputVolume",
                json!({ "inputVolumeDb": -6.0, "inputVolumeMul": 0.5 }),
            )
            .respond("GetInputAudioBalance", json!({ "inputAudioBalance": 0.5 }))
            .respond("GetInputAudioSyncOffset", json!({ "inputAudioSyncOffset": 120 }))
            .respond(
                "GetInputAudioMonitorType",
                json!({ "monitorType": "OBS_MONITORING_TYPE_MONITOR_ONLY" }),
            );
        session
    }

    fn with_source(session: Arc<ScriptedSession>, name: &str) -> BuildContext<ScriptedSession> {
        let store = Arc::new(StateStore::new());
        store
            .sources
            .upsert(name.into(), Source::new(name, SourceKind::Audio));
        BuildContext::new(session, store)
    }

    #[tokio::test]
    async fn positive_probe_fills_every_audio_field() {
        let ctx = with_source(audio_session(), "Mic");
        let reaction = probe_audio(&ctx, "Mic").await.unwrap();
        assert_eq!(reaction.changes, ChangeSet::AUDIO);

        let audio = ctx.store.source("Mic").unwrap().audio.clone().unwrap();
        assert!(audio.muted);
        assert!((audio.volume_db + 6.0).abs() < f64::EPSILON);
        assert_eq!(audio.sync_offset_ms, 120);
        assert_eq!(audio.monitor_type, MonitorType::MonitorOnly);
        assert_eq!(audio.tracks.get("1"), Some(&true));
    }

    #[tokio::test]
    async fn capability_absent_probe_is_silent() {
        for code in [600, 602, 604] {
            let session = Arc::new(ScriptedSession::default());
            session.reject("GetInputAudioTracks", code);
            let ctx = with_source(Arc::clone(&session), "Camera");

            let reaction = probe_audio(&ctx, "Camera").await.unwrap();
            assert_eq!(reaction, Reaction::default());
            assert!(ctx.store.source("Camera").unwrap().audio.is_none());
            assert_eq!(session.count("GetInputMute"), 0);
        }
    }

    #[tokio::test]
    async fn lost_session_during_probe_is_escalated() {
        let session = Arc::new(ScriptedSession::default());
        session.on("GetInputAudioTracks", |_| Err(scenesync_api::Error::NotConnected));
        let ctx = with_source(session, "Mic");
        assert!(probe_audio(&ctx, "Mic").await.unwrap_err().is_not_connected());
    }

    #[tokio::test]
    async fn mute_event_during_probe_wins() {
        let session = audio_session();
        let ctx = with_source(Arc::clone(&session), "Mic");
        let store = Arc::clone(&ctx.store);
        session.on("GetInputMute", move |_| {
            store.sources.update("Mic", |s| {
                s.audio.get_or_insert_with(AudioState::default).muted = false;
            });
            store.mark("Mic", field::MUTE);
            Ok(json!({ "inputMuted": true }))
        });

        probe_audio(&ctx, "Mic").await.unwrap();
        let audio = ctx.store.source("Mic").unwrap().audio.clone().unwrap();
        assert!(!audio.muted);
        assert_eq!(audio.sync_offset_ms, 120);
    }

    #[tokio::test]
    async fn special_inputs_survive_pruning() {
        let session = Arc::new(ScriptedSession::default());
        session.respond(
            "GetSpecialInputs",
            json!({ "desktop1": "Desktop Audio", "desktop2": null, "mic1": "Mic/Aux" }),
        );
        let ctx = BuildContext::new(session, Arc::new(StateStore::new()));

        let reaction = special_inputs(&ctx).await.unwrap();
        let names: Vec<String> = ctx
            .store
            .sources_snapshot()
            .iter()
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(names, ["Desktop Audio", "Mic/Aux"]);
        assert_eq!(reaction.follow_ups.len(), 2);
    }

    #[tokio::test]
    async fn filter_refresh_replaces_chain() {
        let session = Arc::new(ScriptedSession::default());
        session.respond(
            "GetSourceFilterList",
            json!({ "filters": [
                { "filterName": "Sharpen", "filterKind": "sharpness_filter", "filterIndex": 1, "filterEnabled": true },
                { "filterName": "Crop", "filterKind": "crop_filter", "filterIndex": 0, "filterEnabled": false }
            ]}),
        );
        let ctx = with_source(session, "Cam");
        let reaction = filters(&ctx, "Cam").await.unwrap();
        assert_eq!(reaction.changes, ChangeSet::FILTERS);
        let chain: Vec<String> = ctx
            .store
            .source_filters("Cam")
            .unwrap()
            .filters
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert_eq!(chain, ["Crop", "Sharpen"]);
    }
}
