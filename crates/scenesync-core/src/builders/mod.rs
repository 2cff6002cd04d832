// ── Bulk builders ──
//
// Request-driven rebuilds of store slices. A builder takes a ticket
// before issuing its request and applies the response under the
// structure lock, skipping every field an event wrote in the meantime.

mod scenes;
mod session;
mod sources;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use scenesync_api::{BatchRequest, BatchResponse, Session};

use crate::error::CoreError;
use crate::reconcile::{FollowUp, Reaction};
use crate::store::{StateStore, Ticket};

pub(crate) use scenes::{group, preview_scene, scene_list, source_list};
pub(crate) use session::{
    apply_record_status, apply_stream_status, current_transition, dsk_items, dsk_tabs,
    output_status, outputs, profiles, remote_info, scene_collections, transitions,
};
pub(crate) use sources::{filters, probe_audio, special_inputs};

/// A live session plus the store it feeds.
pub(crate) struct BuildContext<S> {
    pub(crate) session: Arc<S>,
    pub(crate) store: Arc<StateStore>,
}

impl<S> Clone for BuildContext<S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Session> BuildContext<S> {
    pub(crate) fn new(session: Arc<S>, store: Arc<StateStore>) -> Self {
        Self { session, store }
    }

    /// Unary request decoded into `T`.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        request_type: &str,
        data: Option<Value>,
    ) -> Result<T, CoreError> {
        debug!(request_type, "request");
        let value = self.session.call(request_type, data).await?;
        decode(request_type, value)
    }

    pub(crate) async fn batch(
        &self,
        requests: Vec<BatchRequest>,
    ) -> Result<Vec<BatchResponse>, CoreError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = requests.len(), "batch request");
        Ok(self.session.call_batch(requests).await?)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(request_type: &str, value: Value) -> Result<T, CoreError> {
    serde_json::from_value(value)
        .map_err(|e| CoreError::Internal(format!("{request_type} response: {e}")))
}

/// Decode one batch item. A rejected or undecodable item is logged and
/// yields `None`; the rest of the batch still applies.
pub(crate) fn item<T: DeserializeOwned>(response: BatchResponse) -> Option<T> {
    let request_type = response.request_type.clone();
    let request_id = response.request_id.clone();
    let decoded = response
        .into_result()
        .map_err(CoreError::from)
        .and_then(|value| decode(&request_type, value));
    match decoded {
        Ok(value) => Some(value),
        Err(e) if e.is_capability_absent() => {
            debug!(%request_type, %request_id, error = %e, "batch item not applicable");
            None
        }
        Err(e) => {
            warn!(%request_type, %request_id, error = %e, "batch item failed");
            None
        }
    }
}

/// Whether a per-collection response issued under `ticket` may apply.
pub(crate) fn accepts(store: &StateStore, ticket: &Ticket) -> bool {
    store.is_current(ticket) && !store.is_suspended()
}

pub(crate) fn stale(request_type: &str) -> Result<Reaction, CoreError> {
    debug!(request_type, "discarding stale response");
    Ok(Reaction::default())
}

// ── Sequencing ──────────────────────────────────────────────────────

/// Top-level rebuild of everything that belongs to the current scene
/// collection. Per-scene work comes back as follow-ups.
pub(crate) async fn collection<S: Session>(ctx: &BuildContext<S>) -> Result<Reaction, CoreError> {
    info!("rebuilding scene collection");
    let mut reaction = Reaction::default();
    absorb(&mut reaction, "profiles", profiles(ctx).await)?;
    absorb(&mut reaction, "scene collections", scene_collections(ctx).await)?;
    absorb(&mut reaction, "transitions", transitions(ctx).await)?;
    absorb(&mut reaction, "current transition", current_transition(ctx).await)?;
    absorb(&mut reaction, "special inputs", special_inputs(ctx).await)?;
    absorb(&mut reaction, "scenes", scene_list(ctx).await)?;
    Ok(reaction.with(FollowUp::RebuildDskTabs))
}

fn absorb(
    reaction: &mut Reaction,
    step: &str,
    result: Result<Reaction, CoreError>,
) -> Result<(), CoreError> {
    match result {
        Ok(r) => {
            reaction.merge(r);
            Ok(())
        }
        Err(e) if e.is_not_connected() => Err(e),
        Err(e) => {
            warn!(step, error = %e, "rebuild step failed");
            Ok(())
        }
    }
}

/// Execute one follow-up. `ConnectionLost` is handed back untouched.
pub(crate) async fn run<S: Session>(
    ctx: &BuildContext<S>,
    follow_up: &FollowUp,
) -> Result<Reaction, CoreError> {
    match follow_up {
        FollowUp::RebuildSourceList { scene } => source_list(ctx, scene).await,
        FollowUp::RebuildGroup { group: name } => group(ctx, name).await,
        FollowUp::RefreshFilters { source } => filters(ctx, source).await,
        FollowUp::ProbeAudio { source } => probe_audio(ctx, source).await,
        FollowUp::FetchCurrentTransition => current_transition(ctx).await,
        FollowUp::FetchPreviewScene => preview_scene(ctx).await,
        FollowUp::RebuildCollection => collection(ctx).await,
        FollowUp::RefreshRemoteInfo => remote_info(ctx).await,
        FollowUp::RebuildDskTabs => dsk_tabs(ctx).await,
        FollowUp::ConnectionLost => Ok(Reaction::follow_up(FollowUp::ConnectionLost)),
    }
}

/// Work through `follow_ups` and everything they spawn, each at most
/// once. Failures are contained unless the session is gone. The result
/// carries the union of changes plus any `ConnectionLost` request.
pub(crate) async fn drain<S: Session>(
    ctx: &BuildContext<S>,
    follow_ups: Vec<FollowUp>,
) -> Result<Reaction, CoreError> {
    let mut queue: VecDeque<FollowUp> = follow_ups.into();
    let mut done: HashSet<FollowUp> = HashSet::new();
    let mut outcome = Reaction::default();

    while let Some(next) = queue.pop_front() {
        if next == FollowUp::ConnectionLost {
            outcome.merge(Reaction::follow_up(next));
            continue;
        }
        if !done.insert(next.clone()) {
            continue;
        }
        match run(ctx, &next).await {
            Ok(reaction) => {
                outcome.changes |= reaction.changes;
                queue.extend(reaction.follow_ups);
            }
            Err(e) if e.is_not_connected() => return Err(e),
            Err(e) => warn!(follow_up = ?next, error = %e, "follow-up failed"),
        }
    }
    Ok(outcome)
}

// ── Test support ────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use serde_json::Value;
    use tokio::sync::Notify;

    use scenesync_api::{BatchRequest, BatchResponse, Error, Session};

    type Handler = Box<dyn Fn(Option<&Value>) -> Result<Value, Error> + Send + Sync>;

    /// Session answering from per-request-type handlers. Unknown request
    /// types are rejected with code 204.
    #[derive(Default)]
    pub(crate) struct ScriptedSession {
        handlers: Mutex<HashMap<String, Handler>>,
        gates: Mutex<HashMap<String, Arc<Notify>>>,
        pub(crate) calls: Mutex<Vec<(String, Option<Value>)>>,
    }

    impl ScriptedSession {
        pub(crate) fn on(
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

        pub(crate) fn respond(&self, request_type: &str, value: Value) -> &Self {
            self.on(request_type, move |_| Ok(value.clone()))
        }

        pub(crate) fn reject(&self, request_type: &str, code: u16) -> &Self {
            let owned = request_type.to_owned();
            self.on(request_type, move |_| {
                Err(Error::Request {
                    request_type: owned.clone(),
                    code,
                    comment: None,
                })
            })
        }

        /// Hold the next `request_type` response until the returned gate
        /// is notified. The answer itself is taken when the request goes out.
        pub(crate) fn hold(&self, request_type: &str) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.gates
                .lock()
                .unwrap()
                .insert(request_type.to_owned(), Arc::clone(&gate));
            gate
        }

        pub(crate) fn count(&self, request_type: &str) -> usize {
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
            let handlers = self.handlers.lock().unwrap();
            match handlers.get(request_type) {
                Some(handler) => handler(data),
                None => Err(Error::Request {
                    request_type: request_type.to_owned(),
                    code: 204,
                    comment: Some("unknown request type".into()),
                }),
            }
        }
    }

    impl Session for ScriptedSession {
        async fn call(&self, request_type: &str, request_data: Option<Value>) -> Result<Value, Error> {
            let answer = self.answer(request_type, request_data.as_ref());
            let gate = self.gates.lock().unwrap().remove(request_type);
            if let Some(gate) = gate {
                gate.notified().await;
            }
            answer
        }

        async fn call_batch(&self, requests: Vec<BatchRequest>) -> Result<Vec<BatchResponse>, Error> {
            let mut responses = Vec::with_capacity(requests.len());
            for req in requests {
                match self.answer(&req.request_type, req.request_data.as_ref()) {
                    Ok(data) => {
                        responses.push(BatchResponse::ok(req.request_id, req.request_type, data));
                    }
                    Err(Error::Request { code, comment, .. }) => {
                        responses.push(BatchResponse::failed(
                            req.request_id,
                            req.request_type,
                            code,
                            comment.unwrap_or_default(),
                        ));
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(responses)
        }

        async fn close(&self) {}
    }
}
