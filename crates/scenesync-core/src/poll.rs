// ── Poll schedulers ──
//
// Periodic background refreshes for state the remote does not push:
// performance stats, output status and media playback positions. Each
// scheduler is a `PeriodicTask` handle; dropping or stopping the handle
// is the only way to end it.

use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scenesync_api::responses::{
    MediaInputStatus, OutputStatus, RecordDirectory, Stats, StreamServiceSettings,
};
use scenesync_api::{BatchRequest, Session};

use crate::builders::{self, BuildContext, accepts, item};
use crate::convert;
use crate::error::CoreError;
use crate::model::{PerformanceStats, RecordState};
use crate::store::ChangeSet;

/// One tick's work. `Break` ends the task from the inside.
pub type TickFuture = Pin<Box<dyn Future<Output = ControlFlow<()>> + Send>>;

// ── PeriodicTask ─────────────────────────────────────────────────────

/// Handle to a background loop running one tick per `period`.
///
/// The first tick fires one period after spawning. A tick runs to
/// completion before the next one is scheduled, so slow round-trips
/// delay the cadence instead of piling up.
pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F>(
        name: &'static str,
        period: Duration,
        parent: &CancellationToken,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> TickFuture + Send + 'static,
    {
        let cancel = parent.child_token();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        if tick().await.is_break() {
                            break;
                        }
                    }
                }
            }
            debug!(task = name, "periodic task finished");
        });

        debug!(task = name, ?period, "periodic task started");
        Self {
            name,
            cancel,
            handle,
        }
    }

    /// Stop scheduling ticks. A tick already running completes.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            debug!(task = self.name, "stopping periodic task");
            self.cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Throughput ───────────────────────────────────────────────────────

/// Stream bitrate derived from successive byte counters.
#[derive(Debug, Default)]
pub(crate) struct Throughput {
    last: Option<(Instant, u64)>,
}

impl Throughput {
    /// Record a byte counter reading and return kbit/s since the
    /// previous one. The first reading, or a counter that went
    /// backwards (new stream), yields 0.
    pub(crate) fn sample(&mut self, bytes: u64, now: Instant) -> u64 {
        let previous = self.last.replace((now, bytes));
        let Some((at, before)) = previous else {
            return 0;
        };
        let elapsed_ms = now.saturating_duration_since(at).as_millis();
        if bytes < before || elapsed_ms == 0 {
            return 0;
        }
        // bits per millisecond == kbit per second
        let kbits = u128::from(bytes - before) * 8 / elapsed_ms;
        u64::try_from(kbits).unwrap_or(u64::MAX)
    }

    pub(crate) fn reset(&mut self) {
        self.last = None;
    }
}

// ── Stats poll ───────────────────────────────────────────────────────

/// One stats tick: performance counters, then stream and record status
/// while those outputs run, then every known output.
pub(crate) async fn refresh_stats<S: Session>(
    ctx: &BuildContext<S>,
    throughput: &mut Throughput,
) -> Result<ChangeSet, CoreError> {
    let store = &ctx.store;
    let ticket = store.ticket();
    let mut changes = ChangeSet::empty();

    let stats: Stats = ctx.call("GetStats", None).await?;
    if store.is_current(&ticket)
        && store.update_counters(|c| c.stats = Some(PerformanceStats::from(stats)))
    {
        changes |= ChangeSet::STATS;
    }

    let session = store.session();
    if session.stream.active {
        let status: OutputStatus = ctx.call("GetStreamStatus", None).await?;
        let kbits = throughput.sample(status.output_bytes, Instant::now());
        let service = stream_service(ctx).await?;
        let _guard = store.lock_structure();
        if store.is_current(&ticket)
            && builders::apply_stream_status(store, &ticket, &status, Some(kbits), service)
        {
            changes |= ChangeSet::OUTPUTS;
        }
    } else {
        throughput.reset();
    }

    if session.record.state != RecordState::Stopped {
        let status: OutputStatus = ctx.call("GetRecordStatus", None).await?;
        let directory = match ctx.call::<RecordDirectory>("GetRecordDirectory", None).await {
            Ok(d) => Some(d.record_directory),
            Err(e) if e.is_not_connected() => return Err(e),
            Err(e) => {
                debug!(error = %e, "record directory unavailable");
                None
            }
        };
        let _guard = store.lock_structure();
        if store.is_current(&ticket) {
            let mut changed = builders::apply_record_status(store, &ticket, &status);
            if let Some(directory) = directory {
                changed |= store.update_session(|s| s.record.directory = Some(directory));
            }
            if changed {
                changes |= ChangeSet::OUTPUTS;
            }
        }
    }

    if !store.is_suspended() {
        changes |= builders::output_status(ctx).await?;
    }
    Ok(changes)
}

/// Streaming service name. `Some(None)` means a custom server; `None`
/// means the lookup failed and the previous value stands.
async fn stream_service<S: Session>(
    ctx: &BuildContext<S>,
) -> Result<Option<Option<String>>, CoreError> {
    match ctx
        .call::<StreamServiceSettings>("GetStreamServiceSettings", None)
        .await
    {
        Ok(settings) => {
            let name = if settings.stream_service_type.as_deref() == Some("rtmp_common") {
                settings
                    .stream_service_settings
                    .get("service")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            } else {
                None
            };
            Ok(Some(name))
        }
        Err(e) if e.is_not_connected() => Err(e),
        Err(e) => {
            warn!(error = %e, "stream service settings unavailable");
            Ok(None)
        }
    }
}

// ── Media poll ───────────────────────────────────────────────────────

/// One media tick: playback state of every media input in one batch.
pub(crate) async fn refresh_media<S: Session>(
    ctx: &BuildContext<S>,
) -> Result<ChangeSet, CoreError> {
    let store = &ctx.store;
    let names = store.media_source_names();
    if names.is_empty() {
        return Ok(ChangeSet::empty());
    }

    let ticket = store.ticket();
    let requests = names
        .iter()
        .map(|name| {
            BatchRequest::new(name.as_str(), "GetMediaInputStatus")
                .with_data(json!({ "inputName": name }))
        })
        .collect();
    let responses = ctx.batch(requests).await?;

    let _guard = store.lock_structure();
    if !accepts(store, &ticket) {
        return Ok(ChangeSet::empty());
    }
    let mut changed = false;
    for response in responses {
        let name = response.request_id.clone();
        if !store.sources.contains(&name) {
            continue;
        }
        if let Some(status) = item::<MediaInputStatus>(response) {
            changed |= store
                .media
                .upsert(name.clone(), convert::media_status(&name, status));
        }
    }
    Ok(if changed {
        ChangeSet::MEDIA
    } else {
        ChangeSet::empty()
    })
}
