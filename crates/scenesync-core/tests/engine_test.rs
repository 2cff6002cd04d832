#![allow(clippy::unwrap_used)]

mod support;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use scenesync_api::Error;
use scenesync_core::{ChangeSet, ConnectionStatus, Engine, EngineConfig};

use support::{
    FakeConnector, FakeRemote, engine, eventually, input_item, media_item, text_item,
};

fn source_names<C: scenesync_core::Connector>(engine: &Engine<C>) -> Vec<String> {
    engine
        .sources_snapshot()
        .iter()
        .map(|s| s.name.clone())
        .collect()
}

fn refused() -> Error {
    Error::ConnectionRefused {
        address: "studio.local:4455".into(),
    }
}

// ── Initial sync ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn connect_mirrors_the_remote() {
    let connector = FakeConnector::new(FakeRemote::studio());
    let engine = engine(&connector);

    engine.connect().await.unwrap();

    assert_eq!(engine.status().status, ConnectionStatus::Ok);
    assert_eq!(engine.scene_names(), ["Intro", "Main"]);
    assert_eq!(source_names(&engine), ["Camera", "Intro Clip", "Mic", "Title"]);

    let session = engine.session();
    assert_eq!(session.program_scene.as_deref(), Some("Intro"));
    assert_eq!(session.scene_collections.current.as_deref(), Some("Show"));
    assert_eq!(session.transition.current.as_deref(), Some("Fade"));

    let sources = engine.sources_snapshot();
    let mic = sources.iter().find(|s| s.name == "Mic").unwrap();
    let camera = sources.iter().find(|s| s.name == "Camera").unwrap();
    assert!(mic.audio.is_some());
    assert!(camera.audio.is_none());
}

#[tokio::test(start_paused = true)]
async fn created_scene_is_added_without_a_full_rebuild() {
    let remote = FakeRemote::studio();
    let connector = FakeConnector::new(remote.clone());
    let engine = engine(&connector);
    engine.connect().await.unwrap();
    assert_eq!(remote.count("GetSceneList"), 1);

    remote.set_scenes(vec![
        ("Intro", vec![text_item(1, "Title")]),
        ("Main", vec![input_item(1, "Camera", "v4l2_input")]),
        ("Outro", vec![text_item(1, "Credits")]),
    ]);
    connector.push("SceneCreated", json!({ "sceneName": "Outro", "isGroup": false }));

    eventually("Outro items", || {
        engine
            .scene_items_snapshot()
            .iter()
            .any(|s| s.scene == "Outro" && s.items.len() == 1)
    })
    .await;
    assert_eq!(engine.scene_names(), ["Intro", "Main", "Outro"]);
    assert!(source_names(&engine).contains(&"Credits".to_owned()));
    assert_eq!(remote.count("GetSceneList"), 1);
}

// ── Events ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn mute_event_touches_only_the_named_input() {
    let connector = FakeConnector::new(FakeRemote::studio());
    let engine = engine(&connector);
    engine.connect().await.unwrap();
    let before = engine.sources_snapshot();

    connector.push(
        "InputMuteStateChanged",
        json!({ "inputName": "Mic", "inputMuted": true }),
    );

    eventually("Mic muted", || {
        engine
            .sources_snapshot()
            .iter()
            .any(|s| s.name == "Mic" && s.audio.as_ref().is_some_and(|a| a.muted))
    })
    .await;
    let after = engine.sources_snapshot();
    for source in after.iter().filter(|s| s.name != "Mic") {
        let old = before.iter().find(|s| s.name == source.name).unwrap();
        assert_eq!(source, old);
    }
}

#[tokio::test(start_paused = true)]
async fn input_rename_keeps_the_record_and_references() {
    let connector = FakeConnector::new(FakeRemote::studio());
    let engine = engine(&connector);
    engine.connect().await.unwrap();

    connector.push(
        "InputNameChanged",
        json!({ "oldInputName": "Camera", "inputName": "Cam A" }),
    );

    eventually("rename", || source_names(&engine).contains(&"Cam A".to_owned())).await;
    assert!(!source_names(&engine).contains(&"Camera".to_owned()));

    let sources = engine.sources_snapshot();
    let renamed = sources.iter().find(|s| s.name == "Cam A").unwrap();
    assert_eq!(renamed.input_kind.as_deref(), Some("v4l2_input"));

    let items = engine.scene_items_snapshot();
    let main = items.iter().find(|s| s.scene == "Main").unwrap();
    assert!(main.items.iter().any(|i| i.source_name == "Cam A"));
}

#[tokio::test(start_paused = true)]
async fn collection_switch_drops_events_then_rebuilds() {
    let remote = FakeRemote::studio();
    let connector = FakeConnector::new(remote.clone());
    let engine = engine(&connector);
    engine.connect().await.unwrap();

    connector.push(
        "CurrentSceneCollectionChanging",
        json!({ "sceneCollectionName": "Show" }),
    );
    connector.push("SceneCreated", json!({ "sceneName": "Ghost", "isGroup": false }));
    eventually("switch window", || engine.session().collection_changing).await;
    assert!(!engine.scene_names().contains(&"Ghost".to_owned()));

    remote.set_scenes(vec![("Rehearsal Cam", vec![input_item(1, "Camera", "v4l2_input")])]);
    remote.respond(
        "GetSceneCollectionList",
        json!({ "currentSceneCollectionName": "Rehearsal", "sceneCollections": ["Show", "Rehearsal"] }),
    );
    connector.push(
        "CurrentSceneCollectionChanged",
        json!({ "sceneCollectionName": "Rehearsal" }),
    );

    eventually("rebuilt collection", || {
        engine.scene_names() == ["Rehearsal Cam"] && !source_names(&engine).is_empty()
    })
    .await;
    let session = engine.session();
    assert!(!session.collection_changing);
    assert_eq!(session.scene_collections.current.as_deref(), Some("Rehearsal"));
    assert_eq!(source_names(&engine), ["Camera"]);
}

// ── Connection failures ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn missing_host_is_bad_config_without_retry() {
    let connector = FakeConnector::new(FakeRemote::studio());
    let engine = Engine::new(EngineConfig::new("  ", 4455), connector.clone());

    let err = engine.connect().await.unwrap_err();

    assert!(err.to_string().contains("IP address or hostname"));
    assert_eq!(engine.status().status, ConnectionStatus::BadConfig);
    assert!(!engine.is_reconnecting());
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_password_is_bad_config_without_retry() {
    let connector = FakeConnector::new(FakeRemote::studio());
    connector.fail_next(Error::Authentication {
        message: "bad password".into(),
    });
    let engine = engine(&connector);

    engine.connect().await.unwrap_err();
    tokio::time::sleep(Duration::from_secs(12)).await;

    assert_eq!(engine.status().status, ConnectionStatus::BadConfig);
    assert!(!engine.is_reconnecting());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_keep_a_single_retry_timer() {
    let connector = FakeConnector::new(FakeRemote::studio());
    for _ in 0..3 {
        connector.fail_next(refused());
    }
    let engine = engine(&connector);

    engine.connect().await.unwrap_err();
    engine.connect().await.unwrap_err();
    assert_eq!(engine.status().status, ConnectionStatus::ConnectionFailure);
    assert!(engine.is_reconnecting());

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(connector.attempts(), 3);

    tokio::time::sleep(Duration::from_secs(5)).await;
    eventually("reconnected", || engine.status().status == ConnectionStatus::Ok).await;
    assert_eq!(connector.attempts(), 4);
    assert!(!engine.is_reconnecting());
    assert_eq!(engine.scene_names(), ["Intro", "Main"]);
}

#[tokio::test(start_paused = true)]
async fn exit_started_starts_reconnecting_and_keeps_data() {
    let connector = FakeConnector::new(FakeRemote::studio());
    let engine = engine(&connector);
    engine.connect().await.unwrap();

    connector.push("ExitStarted", json!({}));

    eventually("reconnect cycle", || engine.is_reconnecting()).await;
    let status = engine.status();
    assert_eq!(status.status, ConnectionStatus::Disconnected);
    assert_eq!(status.message.as_deref(), Some("Connection lost"));
    assert_eq!(engine.scene_names(), ["Intro", "Main"]);

    tokio::time::sleep(Duration::from_secs(5)).await;
    eventually("reconnected", || engine.status().status == ConnectionStatus::Ok).await;
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_socket_starts_reconnecting() {
    let connector = FakeConnector::new(FakeRemote::studio());
    let engine = engine(&connector);
    engine.connect().await.unwrap();

    connector.kill();

    eventually("reconnect cycle", || engine.is_reconnecting()).await;
    assert!(!engine.is_polling_media());
}

#[tokio::test(start_paused = true)]
async fn disconnect_stops_everything_and_is_idempotent() {
    let connector = FakeConnector::new(FakeRemote::studio());
    let engine = engine(&connector);
    engine.connect().await.unwrap();
    assert!(engine.is_polling_media());

    engine.disconnect().await;
    engine.disconnect().await;

    assert_eq!(engine.status().status, ConnectionStatus::Disconnected);
    assert!(!engine.is_reconnecting());
    assert!(!engine.is_polling_media());
    assert!(engine.send_request("GetVersion", None).await.is_err());
    assert_eq!(engine.scene_names(), ["Intro", "Main"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_refuses_later_connects() {
    let connector = FakeConnector::new(FakeRemote::studio());
    let engine = engine(&connector);
    engine.connect().await.unwrap();

    engine.shutdown().await;

    assert!(engine.connect().await.is_err());
    assert_eq!(connector.attempts(), 1);
}

// ── Derived outputs ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn choice_lists_follow_the_structure() {
    let connector = FakeConnector::new(FakeRemote::studio());
    let engine = engine(&connector);
    let mut lists = engine.choice_lists();

    engine.connect().await.unwrap();
    assert!(lists.has_changed().unwrap());

    let current = lists.borrow_and_update().clone();
    let ids = |choices: &[scenesync_core::Choice]| {
        choices.iter().map(|c| c.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&current.scenes), ["Intro", "Main"]);
    assert_eq!(ids(&current.text_sources), ["Title"]);
    assert_eq!(ids(&current.media_sources), ["Intro Clip"]);

    connector.push("SceneRemoved", json!({ "sceneName": "Intro", "isGroup": false }));
    eventually("lists rebuilt", || lists.has_changed().unwrap()).await;
    let current = lists.borrow_and_update().clone();
    assert_eq!(ids(&current.scenes), ["Main"]);
    assert!(current.text_sources.is_empty());
}

#[tokio::test(start_paused = true)]
async fn scene_events_match_a_fresh_rebuild() {
    let remote = FakeRemote::studio();
    let connector = FakeConnector::new(remote.clone());
    let engine = engine(&connector);
    engine.connect().await.unwrap();

    remote.set_scenes(vec![
        ("Opening", vec![text_item(1, "Title"), media_item(2, "Intro Clip")]),
        ("Outro", vec![text_item(1, "Credits")]),
    ]);
    connector.push("SceneCreated", json!({ "sceneName": "Outro", "isGroup": false }));
    connector.push(
        "SceneNameChanged",
        json!({ "oldSceneName": "Intro", "sceneName": "Opening" }),
    );
    connector.push("SceneRemoved", json!({ "sceneName": "Main", "isGroup": false }));

    eventually("events applied", || {
        engine.scene_names() == ["Opening", "Outro"]
            && source_names(&engine) == ["Credits", "Intro Clip", "Title"]
    })
    .await;
    let lists = engine.choice_lists();
    eventually("lists derived", || {
        lists.borrow().text_sources.iter().any(|c| c.id == "Credits")
    })
    .await;
    let incremental = lists.borrow().clone();

    let fresh = support::engine(&FakeConnector::new(remote.clone()));
    fresh.connect().await.unwrap();
    let rebuilt = fresh.choice_lists().borrow().clone();

    assert_eq!(incremental.scenes, rebuilt.scenes);
    assert_eq!(incremental.scenes_any, rebuilt.scenes_any);
    assert_eq!(incremental.sources, rebuilt.sources);
    assert_eq!(incremental.text_sources, rebuilt.text_sources);
    assert_eq!(incremental.media_sources, rebuilt.media_sources);
    assert_eq!(rebuilt.scenes.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn media_poll_runs_only_while_media_sources_exist() {
    let remote = FakeRemote::studio();
    remote.on("GetMediaInputStatus", |_| {
        Ok(json!({ "mediaState": "OBS_MEDIA_STATE_PLAYING", "mediaDuration": 10_000, "mediaCursor": 2_000 }))
    });
    let connector = FakeConnector::new(remote.clone());
    let engine = engine(&connector);
    engine.connect().await.unwrap();
    assert!(engine.is_polling_media());

    eventually("media status", || !engine.media_snapshot().is_empty()).await;
    assert!(remote.count("GetMediaInputStatus") >= 1);

    connector.push("InputRemoved", json!({ "inputName": "Intro Clip" }));
    eventually("poll stopped", || !engine.is_polling_media()).await;
}

#[tokio::test(start_paused = true)]
async fn change_sets_are_broadcast_in_order() {
    let connector = FakeConnector::new(FakeRemote::studio());
    let engine = engine(&connector);
    engine.connect().await.unwrap();
    let mut changes = engine.changes();

    connector.push("CurrentProgramSceneChanged", json!({ "sceneName": "Main" }));

    let mut seen = ChangeSet::empty();
    while !seen.contains(ChangeSet::PROGRAM) {
        seen |= changes.recv().await.unwrap();
    }
    assert_eq!(engine.session().program_scene.as_deref(), Some("Main"));
}
