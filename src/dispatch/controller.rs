//! Watch stream lifecycle and the dispatch loop.
//!
//! The controller owns at most one active stream. Starting it opens the
//! backend stream and spawns a dedicated dispatch thread; each batch is
//! processed in arrival order, each event is routed against a registry
//! snapshot and delivered synchronously to the winning subscribers.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::backend::{DeviceId, StreamSpec, WatchBackend, WatchHandle};
use crate::config::WatchConfig;
use crate::error::{ExecutionError, FsNoteResult, LifecycleError, ValidationError};
use crate::event::{EventBatch, RawEvent};
use crate::flags::{decode, CreateFlags, Note};

use super::registry::SubscriptionRegistry;
use super::router::{EventRouter, SpecificityRouter};
use super::subscriber::Subscriber;

/// Unique identifier for one started stream.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Creates a random stream id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Description of the active stream.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub stream_id: StreamId,
    pub paths: Vec<PathBuf>,
    pub device: DeviceId,
    pub latency_ms: u64,
    pub create_flags: CreateFlags,
    pub started_at: DateTime<Utc>,
}

/// Counters accumulated over every stream the controller has run.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub batches: u64,
    pub events: u64,
    /// Events that matched no registered path.
    pub unrouted_events: u64,
    pub deliveries: u64,
    /// Deliveries whose sink returned an error or panicked.
    pub failed_deliveries: u64,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    batches: AtomicU64,
    events: AtomicU64,
    unrouted_events: AtomicU64,
    deliveries: AtomicU64,
    failed_deliveries: AtomicU64,
}

impl DispatchCounters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            batches: self.batches.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            unrouted_events: self.unrouted_events.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            failed_deliveries: self.failed_deliveries.load(Ordering::Relaxed),
        }
    }
}

struct ActiveStream {
    id: StreamId,
    spec: StreamSpec,
    started_at: DateTime<Utc>,
    handle: Box<dyn WatchHandle>,
    stop_tx: Sender<()>,
    stopping: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ActiveStream {
    fn status(&self) -> StreamStatus {
        StreamStatus {
            stream_id: self.id,
            paths: self.spec.paths.clone(),
            device: self.spec.device,
            latency_ms: self.spec.latency.as_millis().min(u128::from(u64::MAX)) as u64,
            create_flags: self.spec.flags,
            started_at: self.started_at,
        }
    }

    fn shutdown(self) {
        let Self {
            id,
            mut handle,
            stop_tx,
            stopping,
            join,
            ..
        } = self;

        // Flag first so a loop in the middle of a batch stops at the next event,
        // then close the stop channel to wake it if it is idle.
        stopping.store(true, Ordering::Release);
        drop(stop_tx);
        handle.stop();

        let Some(join) = join else {
            return;
        };
        if join.thread().id() == thread::current().id() {
            // Stopped from inside a subscriber; the loop exits once it returns.
            debug!(stream_id = %id, "stop requested from dispatch thread, detaching");
            return;
        }
        if join.join().is_err() {
            error!(stream_id = %id, "dispatch thread panicked;");
        }
        debug!(stream_id = %id, "watch stream stopped");
    }
}

/// Owns the lifecycle of one watch stream at a time.
pub struct StreamController {
    registry: Arc<SubscriptionRegistry>,
    backend: Arc<dyn WatchBackend>,
    router: Arc<dyn EventRouter>,
    config: WatchConfig,
    counters: Arc<DispatchCounters>,
    active: Option<ActiveStream>,
}

impl StreamController {
    /// Creates an idle controller using [`SpecificityRouter`].
    #[must_use]
    pub fn new(registry: Arc<SubscriptionRegistry>, backend: Arc<dyn WatchBackend>, config: WatchConfig) -> Self {
        Self {
            registry,
            backend,
            router: Arc::new(SpecificityRouter),
            config,
            counters: Arc::new(DispatchCounters::default()),
            active: None,
        }
    }

    /// Replaces the routing policy. Takes effect on the next start.
    #[must_use]
    pub fn with_router(mut self, router: Arc<dyn EventRouter>) -> Self {
        self.router = router;
        self
    }

    /// The configuration streams are started with.
    #[must_use]
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Validates `paths` and resolves the device of the first one.
    pub fn prepare<P: AsRef<Path>>(&self, paths: &[P]) -> FsNoteResult<StreamSpec> {
        let Some(first) = paths.first() else {
            return Err(ValidationError::EmptyPathList.into());
        };
        if let Some(index) = paths.iter().position(|p| p.as_ref().as_os_str().is_empty()) {
            return Err(ValidationError::EmptyPath { index }.into());
        }

        let device = self.backend.device_for_path(first.as_ref())?;

        Ok(StreamSpec {
            paths: paths.iter().map(|p| p.as_ref().to_path_buf()).collect(),
            device,
            latency: self.config.latency(),
            flags: self.config.create_flags,
            queue_capacity: self.config.batch_queue_capacity,
        })
    }

    /// Resolves `paths` and starts watching them.
    pub fn start_watch<P: AsRef<Path>>(&mut self, paths: &[P]) -> FsNoteResult<StreamId> {
        if self.active.is_some() {
            return Err(LifecycleError::AlreadyWatching.into());
        }
        let spec = self.prepare(paths)?;
        self.start_with(spec)
    }

    /// Starts watching with an already prepared spec.
    pub fn start_with(&mut self, spec: StreamSpec) -> FsNoteResult<StreamId> {
        if self.active.is_some() {
            return Err(LifecycleError::AlreadyWatching.into());
        }

        let mut handle = self.backend.open(&spec)?;
        let batches = handle.events();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let stopping = Arc::new(AtomicBool::new(false));
        let id = StreamId::new();

        let worker = DispatchWorker {
            stream_id: id,
            registry: Arc::clone(&self.registry),
            router: Arc::clone(&self.router),
            counters: Arc::clone(&self.counters),
            stopping: Arc::clone(&stopping),
        };
        let join = match thread::Builder::new()
            .name("fsnote-dispatch".to_string())
            .spawn(move || worker.run(&batches, &stop_rx))
        {
            Ok(join) => join,
            Err(source) => {
                handle.stop();
                return Err(ExecutionError::Spawn { source }.into());
            }
        };

        debug!(stream_id = %id, paths = ?spec.paths, device = %spec.device, "watch stream started");
        self.active = Some(ActiveStream {
            id,
            spec,
            started_at: Utc::now(),
            handle,
            stop_tx,
            stopping,
            join: Some(join),
        });

        Ok(id)
    }

    /// Stops the active stream. No event is delivered after this returns,
    /// unless it is called from inside a subscriber.
    pub fn stop_watch(&mut self) -> FsNoteResult<()> {
        let active = self.active.take().ok_or(LifecycleError::NotWatching)?;
        active.shutdown();
        Ok(())
    }

    /// True while a stream is active.
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        self.active.is_some()
    }

    /// Description of the active stream, if any.
    #[must_use]
    pub fn status(&self) -> Option<StreamStatus> {
        self.active.as_ref().map(ActiveStream::status)
    }

    /// Counters accumulated since the controller was created.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }
}

impl fmt::Debug for StreamController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamController")
            .field("config", &self.config)
            .field("active", &self.status())
            .finish_non_exhaustive()
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.shutdown();
        }
    }
}

struct DispatchWorker {
    stream_id: StreamId,
    registry: Arc<SubscriptionRegistry>,
    router: Arc<dyn EventRouter>,
    counters: Arc<DispatchCounters>,
    stopping: Arc<AtomicBool>,
}

impl DispatchWorker {
    fn run(&self, batches: &Receiver<EventBatch>, stop_rx: &Receiver<()>) {
        loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(batches) -> msg => match msg {
                    Ok(batch) => {
                        if !self.dispatch_batch(batch) {
                            break;
                        }
                    }
                    Err(_) => {
                        debug!(stream_id = %self.stream_id, "event source closed");
                        break;
                    }
                },
            }
        }
        trace!(stream_id = %self.stream_id, "dispatch loop exited");
    }

    /// Returns false once a stop has been requested.
    fn dispatch_batch(&self, batch: EventBatch) -> bool {
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        for event in &batch {
            if self.stopping.load(Ordering::Acquire) {
                return false;
            }
            self.dispatch_event(event);
        }
        !self.stopping.load(Ordering::Acquire)
    }

    fn dispatch_event(&self, event: &RawEvent) {
        self.counters.events.fetch_add(1, Ordering::Relaxed);
        let note = decode(event.flags);
        trace!(event_id = event.id, path = %event.path, flags = %note, "event");

        let snapshot = self.registry.lookup();
        let Some(matched) = self.router.route(&event.path, &snapshot) else {
            self.counters.unrouted_events.fetch_add(1, Ordering::Relaxed);
            return;
        };

        for subscriber in matched.subscribers {
            if self.stopping.load(Ordering::Acquire) {
                return;
            }
            self.deliver(subscriber, event, &note);
        }
    }

    fn deliver(&self, subscriber: &Subscriber, event: &RawEvent, note: &Note) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber.deliver(&event.path, note)));
        match outcome {
            Ok(Ok(())) => {
                self.counters.deliveries.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.counters.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                warn!(subscriber_id = %subscriber.id(), event_id = event.id, path = %event.path, %e, "subscriber failed;");
            }
            Err(_) => {
                self.counters.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                warn!(subscriber_id = %subscriber.id(), event_id = event.id, path = %event.path, "subscriber panicked;");
            }
        }
    }
}
