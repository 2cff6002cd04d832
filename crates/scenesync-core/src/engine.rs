// ── Engine ──
//
// Connection supervisor for one remote instance. Owns the store, the
// live session and every background task: event dispatcher, follow-up
// builders, stats and media polls, and the reconnection timer.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use strum::Display;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use scenesync_api::{
    BatchRequest, BatchResponse, Connector, EventReceiver, RawEvent, Session, TransportEvent,
    WebSocketConnector,
};

use crate::builders::{self, BuildContext};
use crate::config::EngineConfig;
use crate::error::{CoreError, ErrorClass};
use crate::event::Event;
use crate::model::{
    Counters, Group, MediaStatus, Output, Scene, SceneItems, SessionState, Source,
    SourceFilters, Transition,
};
use crate::poll::{self, PeriodicTask, Throughput, TickFuture};
use crate::reconcile::{self, FollowUp};
use crate::store::{ChangeSet, StateStore};
use crate::views::ChoiceLists;

const CHANGE_CHANNEL_SIZE: usize = 256;

// ── Connection state ─────────────────────────────────────────────────

/// Lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for the reconnection timer.
    ReconnectWait,
}

/// Operator-facing status of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionStatus {
    Connecting,
    Ok,
    BadConfig,
    ConnectionFailure,
    Disconnected,
    UnknownError,
}

/// Current status plus the last error message, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: ConnectionStatus,
    pub message: Option<String>,
}

impl StatusReport {
    fn new(status: ConnectionStatus, message: Option<String>) -> Self {
        Self { status, message }
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// The state-sync engine.
///
/// Cheaply cloneable. Does not connect on construction; call
/// [`connect()`](Self::connect). Once connected, losing the session
/// starts a fixed-interval reconnection cycle until
/// [`disconnect()`](Self::disconnect) or [`shutdown()`](Self::shutdown).
pub struct Engine<C: Connector> {
    inner: Arc<EngineInner<C>>,
}

impl<C: Connector> Clone for Engine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EngineInner<C: Connector> {
    config: EngineConfig,
    connector: C,
    store: Arc<StateStore>,
    state: watch::Sender<ConnectionState>,
    status: watch::Sender<StatusReport>,
    changes: broadcast::Sender<ChangeSet>,
    choices: watch::Sender<Arc<ChoiceLists>>,
    /// Serializes connect / disconnect.
    connect_lock: tokio::sync::Mutex<()>,
    live: Mutex<Option<Live<C::Session>>>,
    reconnect: Mutex<Option<PeriodicTask>>,
    media_poll: Mutex<Option<PeriodicTask>>,
    epoch: AtomicU64,
    shut_down: AtomicBool,
    root: CancellationToken,
}

/// Everything tied to one open session.
struct Live<S: Session> {
    epoch: u64,
    ctx: BuildContext<S>,
    cancel: CancellationToken,
    _stats: PeriodicTask,
}

impl Engine<WebSocketConnector> {
    /// Engine speaking the WebSocket transport.
    pub fn websocket(config: EngineConfig) -> Self {
        let connector = WebSocketConnector::new(config.transport_config());
        Self::new(config, connector)
    }
}

impl<C: Connector> Engine<C> {
    pub fn new(config: EngineConfig, connector: C) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (status, _) = watch::channel(StatusReport::new(ConnectionStatus::Disconnected, None));
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        let (choices, _) = watch::channel(Arc::new(ChoiceLists::default()));

        Self {
            inner: Arc::new(EngineInner {
                config,
                connector,
                store: Arc::new(StateStore::new()),
                state,
                status,
                changes,
                choices,
                connect_lock: tokio::sync::Mutex::new(()),
                live: Mutex::new(None),
                reconnect: Mutex::new(None),
                media_poll: Mutex::new(None),
                epoch: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
                root: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.store
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open a session and rebuild the mirror from scratch.
    ///
    /// An already open session is closed first. Transient failures
    /// start the reconnection cycle before the error is returned;
    /// configuration, authentication and protocol failures do not.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let _serial = self.inner.connect_lock.lock().await;
        self.open().await
    }

    async fn open(&self) -> Result<(), CoreError> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(CoreError::NotConnected);
        }
        if let Some(live) = self.take_live() {
            debug!("closing previous session");
            self.close(live).await;
        }

        let target = match self.inner.config.target() {
            Ok(target) => target,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        self.set_state(ConnectionState::Connecting);
        self.set_status(ConnectionStatus::Connecting, None);
        info!(url = %target.url, "connecting");

        let (session, events) = match self.inner.connector.connect(&target).await {
            Ok(opened) => opened,
            Err(e) => {
                let e = CoreError::from(e);
                self.fail(&e);
                return Err(e);
            }
        };

        self.stop_reconnect();
        let store = &self.inner.store;
        store.initialize();

        let epoch = self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = self.inner.root.child_token();
        let ctx = BuildContext::new(Arc::new(session), Arc::clone(store));

        let throughput = Arc::new(tokio::sync::Mutex::new(Throughput::default()));
        let stats = {
            let engine = self.clone();
            let ctx = ctx.clone();
            PeriodicTask::spawn("stats", self.inner.config.stats_interval, &cancel, move || {
                stats_tick(engine.clone(), ctx.clone(), Arc::clone(&throughput), epoch)
            })
        };

        *lock(&self.inner.live) = Some(Live {
            epoch,
            ctx: ctx.clone(),
            cancel: cancel.clone(),
            _stats: stats,
        });
        spawn_dispatcher(self.clone(), ctx.clone(), events, cancel, epoch);
        self.set_state(ConnectionState::Connected);
        self.set_status(ConnectionStatus::Ok, None);
        info!("connected");

        let initial = vec![FollowUp::RebuildCollection, FollowUp::RefreshRemoteInfo];
        let reaction = match builders::drain(&ctx, initial).await {
            Ok(reaction) => reaction,
            Err(e) => {
                self.connection_lost(epoch);
                return Err(e);
            }
        };
        self.publish(reaction.changes);
        if reaction.follow_ups.contains(&FollowUp::ConnectionLost) {
            self.connection_lost(epoch);
            return Err(CoreError::NotConnected);
        }

        match poll::refresh_stats(&ctx, &mut Throughput::default()).await {
            Ok(changes) => self.publish(changes),
            Err(e) if e.is_not_connected() => {
                self.connection_lost(epoch);
                return Err(e);
            }
            Err(e) => warn!(error = %e, "initial stats refresh failed"),
        }
        debug!(
            scenes = store.scenes.len(),
            sources = store.sources.len(),
            "initial rebuild complete"
        );
        Ok(())
    }

    /// Close the session and stop every background task. Mirrored data
    /// stays readable; in-flight responses are discarded. Idempotent.
    pub async fn disconnect(&self) {
        let _serial = self.inner.connect_lock.lock().await;
        self.stop_reconnect();
        if let Some(live) = self.take_live() {
            self.close(live).await;
            info!("disconnected");
        }
        self.inner.store.reset();
        self.set_state(ConnectionState::Disconnected);
        self.set_status(ConnectionStatus::Disconnected, None);
    }

    /// Disconnect for good. Later `connect()` calls fail.
    pub async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        self.disconnect().await;
        self.inner.root.cancel();
        debug!("engine shut down");
    }

    /// The session went away under us. Ignored for stale epochs and
    /// while a reconnection cycle is already running.
    pub(crate) fn connection_lost(&self, epoch: u64) {
        if self.reconnect_pending() {
            return;
        }
        let live = {
            let mut slot = lock(&self.inner.live);
            match slot.as_ref() {
                Some(live) if live.epoch == epoch => slot.take(),
                _ => None,
            }
        };
        let Some(live) = live else {
            return;
        };

        error!("connection lost");
        self.stop_media_poll();
        live.cancel.cancel();
        let session = Arc::clone(&live.ctx.session);
        tokio::spawn(async move { session.close().await });
        self.inner.store.reset();

        self.set_status(ConnectionStatus::Disconnected, Some("Connection lost".into()));
        self.schedule_reconnect();
    }

    fn fail(&self, e: &CoreError) {
        let retry = match e.class() {
            ErrorClass::Configuration | ErrorClass::Authentication => {
                error!(error = %e, "bad configuration");
                self.set_status(ConnectionStatus::BadConfig, Some(e.to_string()));
                false
            }
            ErrorClass::Protocol => {
                error!(error = %e, "incompatible remote");
                self.set_status(ConnectionStatus::ConnectionFailure, Some(e.to_string()));
                false
            }
            ErrorClass::Transient | ErrorClass::Remote => {
                warn!(error = %e, "connection attempt failed");
                let status = if matches!(e, CoreError::ConnectionRefused { .. }) {
                    ConnectionStatus::ConnectionFailure
                } else {
                    ConnectionStatus::UnknownError
                };
                self.set_status(status, Some(e.to_string()));
                true
            }
        };
        if retry {
            self.schedule_reconnect();
        } else {
            self.stop_reconnect();
            self.set_state(ConnectionState::Disconnected);
        }
    }

    // ── Reconnection ─────────────────────────────────────────────────

    /// Start the reconnection timer unless one is already running.
    fn schedule_reconnect(&self) {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return;
        }
        self.set_state(ConnectionState::ReconnectWait);
        let mut slot = lock(&self.inner.reconnect);
        if slot.as_ref().is_some_and(PeriodicTask::is_running) {
            return;
        }
        let interval = self.inner.config.reconnect_interval;
        info!(?interval, "scheduling reconnection");
        let engine = self.clone();
        *slot = Some(PeriodicTask::spawn(
            "reconnect",
            interval,
            &self.inner.root,
            move || reconnect_tick(engine.clone()),
        ));
    }

    fn stop_reconnect(&self) {
        if let Some(task) = lock(&self.inner.reconnect).take() {
            task.stop();
        }
    }

    fn reconnect_pending(&self) -> bool {
        lock(&self.inner.reconnect)
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    /// Whether the reconnection timer is active.
    pub fn is_reconnecting(&self) -> bool {
        self.reconnect_pending()
    }

    async fn retry(&self) {
        let _serial = self.inner.connect_lock.lock().await;
        // A disconnect or a manual connect may have won the lock first.
        if !self.reconnect_pending() || self.has_session() {
            return;
        }
        if let Err(e) = self.open().await {
            debug!(error = %e, "reconnection attempt failed");
        }
    }

    // ── Session helpers ──────────────────────────────────────────────

    fn take_live(&self) -> Option<Live<C::Session>> {
        lock(&self.inner.live).take()
    }

    fn has_session(&self) -> bool {
        lock(&self.inner.live).is_some()
    }

    fn context(&self) -> Result<BuildContext<C::Session>, CoreError> {
        lock(&self.inner.live)
            .as_ref()
            .map(|live| live.ctx.clone())
            .ok_or(CoreError::NotConnected)
    }

    fn current_epoch(&self) -> Option<u64> {
        lock(&self.inner.live).as_ref().map(|live| live.epoch)
    }

    async fn close(&self, live: Live<C::Session>) {
        self.stop_media_poll();
        live.cancel.cancel();
        live.ctx.session.close().await;
    }

    fn escalate<T>(&self, result: Result<T, CoreError>) -> Result<T, CoreError> {
        if let Err(e) = &result {
            if e.is_not_connected() {
                if let Some(epoch) = self.current_epoch() {
                    self.connection_lost(epoch);
                }
            }
        }
        result
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Send one request on the live session.
    pub async fn send_request(
        &self,
        request_type: &str,
        data: Option<Value>,
    ) -> Result<Value, CoreError> {
        let ctx = self.context()?;
        let result = ctx
            .session
            .call(request_type, data)
            .await
            .map_err(CoreError::from);
        self.escalate(result)
    }

    /// Send a batch on the live session. Item failures are reported per
    /// item.
    pub async fn send_batch(
        &self,
        requests: Vec<BatchRequest>,
    ) -> Result<Vec<BatchResponse>, CoreError> {
        let ctx = self.context()?;
        let result = ctx.batch(requests).await;
        self.escalate(result)
    }

    /// Scene names in one downstream-keyer tab (zero-based), fetched
    /// now and cached on the session.
    pub async fn dsk_items(&self, tab: u32) -> Result<Vec<String>, CoreError> {
        let ctx = self.context()?;
        let result = builders::dsk_items(&ctx, tab).await;
        if result.is_ok() {
            self.publish(ChangeSet::DSK);
        }
        self.escalate(result)
    }

    // ── Events ───────────────────────────────────────────────────────

    fn on_event(&self, ctx: &BuildContext<C::Session>, raw: &RawEvent, epoch: u64) {
        let event = Event::parse(raw);
        trace!(event = event.kind().as_ref(), "event");
        let reaction = reconcile::apply(&self.inner.store, event);
        self.publish(reaction.changes);

        if reaction.follow_ups.contains(&FollowUp::ConnectionLost) {
            info!("remote is shutting down");
            self.connection_lost(epoch);
            return;
        }
        if !reaction.follow_ups.is_empty() {
            spawn_follow_ups(self.clone(), ctx.clone(), reaction.follow_ups, epoch);
        }
    }

    /// Broadcast `changes`, then refresh the derived lists and the media
    /// poll when the structure moved.
    fn publish(&self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }
        let _ = self.inner.changes.send(changes);

        if changes.intersects(ChangeSet::SOURCES | ChangeSet::COLLECTIONS) {
            self.sync_media_poll();
        }
        if changes.is_structural() {
            let lists = ChoiceLists::build(&self.inner.store);
            self.inner.choices.send_if_modified(|current| {
                if **current == lists {
                    false
                } else {
                    *current = Arc::new(lists);
                    true
                }
            });
        }
    }

    // ── Media poll ───────────────────────────────────────────────────

    /// Run the media poll exactly while media sources exist and no
    /// collection switch is in progress.
    fn sync_media_poll(&self) {
        let store = &self.inner.store;
        let wanted = store.has_media_sources() && !store.is_suspended();
        let mut slot = lock(&self.inner.media_poll);
        let running = slot.as_ref().is_some_and(PeriodicTask::is_running);

        if !wanted {
            if let Some(task) = slot.take() {
                task.stop();
            }
            return;
        }
        if running {
            return;
        }
        let live = lock(&self.inner.live);
        let Some(live) = live.as_ref() else {
            return;
        };
        let engine = self.clone();
        let ctx = live.ctx.clone();
        let epoch = live.epoch;
        *slot = Some(PeriodicTask::spawn(
            "media",
            self.inner.config.media_interval,
            &live.cancel,
            move || media_tick(engine.clone(), ctx.clone(), epoch),
        ));
    }

    fn stop_media_poll(&self) {
        if let Some(task) = lock(&self.inner.media_poll).take() {
            task.stop();
        }
    }

    /// Whether the media poll is active.
    pub fn is_polling_media(&self) -> bool {
        lock(&self.inner.media_poll)
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    // ── Observation ──────────────────────────────────────────────────

    fn set_state(&self, state: ConnectionState) {
        self.inner.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    fn set_status(&self, status: ConnectionStatus, message: Option<String>) {
        let report = StatusReport::new(status, message);
        self.inner.status.send_if_modified(|current| {
            let changed = *current != report;
            *current = report;
            changed
        });
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn status(&self) -> StatusReport {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusReport> {
        self.inner.status.subscribe()
    }

    /// Every non-empty change set, in order.
    pub fn changes(&self) -> broadcast::Receiver<ChangeSet> {
        self.inner.changes.subscribe()
    }

    pub fn choice_lists(&self) -> watch::Receiver<Arc<ChoiceLists>> {
        self.inner.choices.subscribe()
    }

    // ── Snapshot accessors (delegate to StateStore) ──────────────────

    pub fn scenes_snapshot(&self) -> Arc<Vec<Arc<Scene>>> {
        self.inner.store.scenes_snapshot()
    }

    pub fn scene_items_snapshot(&self) -> Arc<Vec<Arc<SceneItems>>> {
        self.inner.store.scene_items_snapshot()
    }

    pub fn groups_snapshot(&self) -> Arc<Vec<Arc<Group>>> {
        self.inner.store.groups_snapshot()
    }

    pub fn sources_snapshot(&self) -> Arc<Vec<Arc<Source>>> {
        self.inner.store.sources_snapshot()
    }

    pub fn filters_snapshot(&self) -> Arc<Vec<Arc<SourceFilters>>> {
        self.inner.store.filters_snapshot()
    }

    pub fn transitions_snapshot(&self) -> Arc<Vec<Arc<Transition>>> {
        self.inner.store.transitions_snapshot()
    }

    pub fn outputs_snapshot(&self) -> Arc<Vec<Arc<Output>>> {
        self.inner.store.outputs_snapshot()
    }

    pub fn media_snapshot(&self) -> Arc<Vec<Arc<MediaStatus>>> {
        self.inner.store.media_snapshot()
    }

    pub fn session(&self) -> SessionState {
        self.inner.store.session()
    }

    pub fn counters(&self) -> Counters {
        self.inner.store.counters()
    }

    /// Scene names in remote order.
    pub fn scene_names(&self) -> Vec<String> {
        self.inner.store.scene_names()
    }
}

// ── Background tasks ─────────────────────────────────────────────────

fn spawn_dispatcher<C: Connector>(
    engine: Engine<C>,
    ctx: BuildContext<C::Session>,
    mut events: EventReceiver,
    cancel: CancellationToken,
    epoch: u64,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = events.recv() => match next {
                    Some(TransportEvent::Event(raw)) => engine.on_event(&ctx, &raw, epoch),
                    Some(TransportEvent::Closed { code, reason }) => {
                        warn!(?code, %reason, "session closed by remote");
                        engine.connection_lost(epoch);
                        break;
                    }
                    None => {
                        engine.connection_lost(epoch);
                        break;
                    }
                },
            }
        }
        debug!(epoch, "event dispatcher stopped");
    });
}

fn spawn_follow_ups<C: Connector>(
    engine: Engine<C>,
    ctx: BuildContext<C::Session>,
    follow_ups: Vec<FollowUp>,
    epoch: u64,
) {
    tokio::spawn(async move {
        match builders::drain(&ctx, follow_ups).await {
            Ok(reaction) => {
                engine.publish(reaction.changes);
                if reaction.follow_ups.contains(&FollowUp::ConnectionLost) {
                    engine.connection_lost(epoch);
                }
            }
            Err(e) => {
                debug!(error = %e, "follow-up aborted");
                engine.connection_lost(epoch);
            }
        }
    });
}

fn stats_tick<C: Connector>(
    engine: Engine<C>,
    ctx: BuildContext<C::Session>,
    throughput: Arc<tokio::sync::Mutex<Throughput>>,
    epoch: u64,
) -> TickFuture {
    Box::pin(async move {
        let mut throughput = throughput.lock().await;
        match poll::refresh_stats(&ctx, &mut throughput).await {
            Ok(changes) => {
                engine.publish(changes);
                ControlFlow::Continue(())
            }
            Err(e) if e.is_not_connected() => {
                engine.connection_lost(epoch);
                ControlFlow::Break(())
            }
            Err(e) => {
                warn!(error = %e, "stats refresh failed");
                ControlFlow::Continue(())
            }
        }
    })
}

fn media_tick<C: Connector>(
    engine: Engine<C>,
    ctx: BuildContext<C::Session>,
    epoch: u64,
) -> TickFuture {
    Box::pin(async move {
        match poll::refresh_media(&ctx).await {
            Ok(changes) => {
                engine.publish(changes);
                ControlFlow::Continue(())
            }
            Err(e) if e.is_not_connected() => {
                engine.connection_lost(epoch);
                ControlFlow::Break(())
            }
            Err(e) => {
                warn!(error = %e, "media refresh failed");
                ControlFlow::Continue(())
            }
        }
    })
}

fn reconnect_tick<C: Connector>(engine: Engine<C>) -> TickFuture {
    Box::pin(async move {
        debug!("reconnection attempt");
        engine.retry().await;
        ControlFlow::Continue(())
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
