// Scripted transport for engine integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use scenesync_api::{
    BatchRequest, BatchResponse, ConnectTarget, Connector, Error, EventReceiver, RawEvent, Session,
    TransportEvent,
};
use scenesync_core::{Engine, EngineConfig};

type Handler = Box<dyn Fn(Option<&Value>) -> Result<Value, Error> + Send + Sync>;

// ── Remote ──────────────────────────────────────────────────────────

/// The fake remote application: request handlers plus a call log.
#[derive(Default)]
pub struct FakeRemote {
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<(String, Option<Value>)>>,
}

impl FakeRemote {
    /// A small studio: `Intro` (title + clip) and `Main` (camera + mic).
    pub fn studio() -> Arc<Self> {
        let remote = Arc::new(Self::default());
        remote
            .respond(
                "GetProfileList",
                json!({ "currentProfileName": "Untitled", "profiles": ["Untitled"] }),
            )
            .respond(
                "GetSceneCollectionList",
                json!({ "currentSceneCollectionName": "Show", "sceneCollections": ["Show", "Rehearsal"] }),
            )
            .respond(
                "GetSceneTransitionList",
                json!({ "currentSceneTransitionName": "Fade", "transitions": [
                    { "transitionName": "Cut", "transitionKind": "cut_transition", "transitionFixed": true },
                    { "transitionName": "Fade", "transitionKind": "fade_transition", "transitionConfigurable": true }
                ]}),
            )
            .respond(
                "GetCurrentSceneTransition",
                json!({ "transitionName": "Fade", "transitionDuration": 300 }),
            )
            .respond("GetSpecialInputs", json!({ "desktop1": null, "mic1": null }))
            .respond("GetVersion", json!({ "obsVersion": "30.2.0", "rpcVersion": 1 }))
            .respond("GetStudioModeEnabled", json!({ "studioModeEnabled": false }))
            .respond("GetOutputList", json!({ "outputs": [] }))
            .respond("GetStats", json!({ "cpuUsage": 3.5, "activeFps": 30.0 }))
            .respond("GetSourceActive", json!({ "videoActive": true, "videoShowing": false }))
            .respond("GetSourceFilterList", json!({ "filters": [] }))
            .respond("GetInputSettings", json!({ "inputSettings": {} }))
            .respond("GetInputMute", json!({ "inputMuted": false }))
            .respond("GetInputVolume", json!({ "inputVolumeDb": 0.0, "inputVolumeMul": 1.0 }))
            .reject("CallVendorRequest", 604);
        remote.on("GetInputAudioTracks", |data| {
            if data.unwrap()["inputName"] == "Mic" {
                Ok(json!({ "inputAudioTracks": { "1": true } }))
            } else {
                Err(rejected("GetInputAudioTracks", 604))
            }
        });
        remote.set_scenes(vec![
            ("Intro", vec![text_item(1, "Title"), media_item(2, "Intro Clip")]),
            ("Main", vec![input_item(1, "Camera", "v4l2_input"), input_item(2, "Mic", "pulse_input_capture")]),
        ]);
        remote
    }

    pub fn on(
        &self,
        request_type: &str,
        handler: impl Fn(Option<&Value>) -> Result<Value, Error> + Send + Sync + 'static,
    ) -> &Self {
        self.handlers
            .lock()
            .unwrap()
            .insert(request_type.to_owned(), Box::new(handler));
        self
    }

    pub fn respond(&self, request_type: &str, value: Value) -> &Self {
        self.on(request_type, move |_| Ok(value.clone()))
    }

    pub fn reject(&self, request_type: &str, code: u16) -> &Self {
        let owned = request_type.to_owned();
        self.on(request_type, move |_| Err(rejected(&owned, code)))
    }

    /// Replace the scene list and every scene's items.
    pub fn set_scenes(&self, scenes: Vec<(&str, Vec<Value>)>) {
        let names: Vec<Value> = scenes
            .iter()
            .enumerate()
            .map(|(i, (name, _))| json!({ "sceneName": name, "sceneIndex": i }))
            .collect();
        let program = scenes.first().map(|(name, _)| (*name).to_owned());
        self.respond(
            "GetSceneList",
            json!({ "currentProgramSceneName": program, "scenes": names }),
        );
        let items: HashMap<String, Vec<Value>> = scenes
            .into_iter()
            .map(|(name, items)| (name.to_owned(), items))
            .collect();
        self.on("GetSceneItemList", move |data| {
            let scene = data.unwrap()["sceneName"].as_str().unwrap().to_owned();
            items
                .get(&scene)
                .map(|items| json!({ "sceneItems": items }))
                .ok_or_else(|| rejected("GetSceneItemList", 600))
        });
    }

    pub fn count(&self, request_type: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == request_type)
            .count()
    }

    fn answer(&self, request_type: &str, data: Option<&Value>) -> Result<Value, Error> {
        self.calls
            .lock()
            .unwrap()
            .push((request_type.to_owned(), data.cloned()));
        match self.handlers.lock().unwrap().get(request_type) {
            Some(handler) => handler(data),
            None => Err(rejected(request_type, 204)),
        }
    }
}

pub fn rejected(request_type: &str, code: u16) -> Error {
    Error::Request {
        request_type: request_type.to_owned(),
        code,
        comment: None,
    }
}

pub fn input_item(id: i64, name: &str, kind: &str) -> Value {
    json!({
        "sceneItemId": id,
        "sceneItemIndex": id - 1,
        "sceneItemEnabled": true,
        "sourceName": name,
        "sourceType": "OBS_SOURCE_TYPE_INPUT",
        "inputKind": kind,
        "isGroup": null
    })
}

pub fn text_item(id: i64, name: &str) -> Value {
    input_item(id, name, "text_ft2_source_v2")
}

pub fn media_item(id: i64, name: &str) -> Value {
    input_item(id, name, "ffmpeg_source")
}

// ── Transport ───────────────────────────────────────────────────────

pub struct FakeSession {
    remote: Arc<FakeRemote>,
    closed: Arc<AtomicBool>,
}

impl Session for FakeSession {
    async fn call(&self, request_type: &str, request_data: Option<Value>) -> Result<Value, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        self.remote.answer(request_type, request_data.as_ref())
    }

    async fn call_batch(&self, requests: Vec<BatchRequest>) -> Result<Vec<BatchResponse>, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        Ok(requests
            .into_iter()
            .map(|req| {
                match self.remote.answer(&req.request_type, req.request_data.as_ref()) {
                    Ok(data) => BatchResponse::ok(req.request_id, req.request_type, data),
                    Err(e) => BatchResponse::failed(
                        req.request_id,
                        req.request_type,
                        e.request_code().unwrap_or(0),
                        e.to_string(),
                    ),
                }
            })
            .collect())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out sessions on the shared remote. Queued failures are
/// returned by the next connection attempts, in order.
#[derive(Clone)]
pub struct FakeConnector {
    pub remote: Arc<FakeRemote>,
    failures: Arc<Mutex<VecDeque<Error>>>,
    attempts: Arc<AtomicUsize>,
    events: Arc<Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>>,
    closed: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl FakeConnector {
    pub fn new(remote: Arc<FakeRemote>) -> Self {
        Self {
            remote,
            failures: Arc::default(),
            attempts: Arc::default(),
            events: Arc::default(),
            closed: Arc::default(),
        }
    }

    pub fn fail_next(&self, error: Error) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Push an event on the most recent session.
    pub fn push(&self, event_type: &str, data: Value) {
        let sender = self.events.lock().unwrap();
        sender
            .as_ref()
            .unwrap()
            .send(TransportEvent::Event(RawEvent {
                event_type: event_type.to_owned(),
                event_intent: 0,
                event_data: Some(data),
            }))
            .unwrap();
    }

    /// Drop the most recent session as if the socket died.
    pub fn kill(&self) {
        if let Some(closed) = self.closed.lock().unwrap().as_ref() {
            closed.store(true, Ordering::SeqCst);
        }
        if let Some(sender) = self.events.lock().unwrap().take() {
            let _ = sender.send(TransportEvent::Closed {
                code: Some(1006),
                reason: "abnormal closure".into(),
            });
        }
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, _target: &ConnectTarget) -> Result<(FakeSession, EventReceiver), Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        *self.events.lock().unwrap() = Some(tx);
        *self.closed.lock().unwrap() = Some(Arc::clone(&closed));
        Ok((
            FakeSession {
                remote: Arc::clone(&self.remote),
                closed,
            },
            rx,
        ))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

pub fn engine(connector: &FakeConnector) -> Engine<FakeConnector> {
    Engine::new(EngineConfig::new("studio.local", 4455), connector.clone())
}

/// Poll `check` until it holds, failing after two (virtual) seconds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
