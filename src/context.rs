//! Process-facing surface: schedule subscribers, then start and stop the stream.
//!
//! A `WatchContext` owns everything that would otherwise be process-wide
//! state: the registry, the controller and the scheduled stream spec.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::backend::{StreamSpec, WatchBackend};
use crate::config::WatchConfig;
use crate::dispatch::controller::{DispatchStats, StreamController, StreamId, StreamStatus};
use crate::dispatch::registry::SubscriptionRegistry;
use crate::dispatch::stream::{self, DeliveryStream};
use crate::dispatch::subscriber::{NotificationSink, Subscriber, SubscriberId};
use crate::error::{FsNoteResult, LifecycleError, ValidationError};

/// Explicit owner of the registry and the stream lifecycle.
#[derive(Debug)]
pub struct WatchContext {
    registry: Arc<SubscriptionRegistry>,
    controller: StreamController,
    scheduled: Option<StreamSpec>,
}

impl WatchContext {
    /// Creates an idle context with an empty registry.
    #[must_use]
    pub fn new(backend: Arc<dyn WatchBackend>, config: WatchConfig) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let controller = StreamController::new(Arc::clone(&registry), backend, config);
        Self {
            registry,
            controller,
            scheduled: None,
        }
    }

    /// Context backed by the real filesystem.
    #[cfg(feature = "native")]
    #[must_use]
    pub fn native(config: WatchConfig) -> Self {
        Self::new(Arc::new(crate::backend::NotifyBackend::new()), config)
    }

    /// Registers `sink` under the first of `paths` and records `paths` as the
    /// stream to open on [`start`](Self::start).
    ///
    /// Fails without side effects if `paths` is empty, contains an empty
    /// path, or the device of the first path cannot be resolved.
    pub fn schedule<S: AsRef<str>>(
        &mut self,
        sink: impl NotificationSink + 'static,
        paths: &[S],
    ) -> FsNoteResult<SubscriberId> {
        self.schedule_subscriber(Subscriber::new(sink), paths)
    }

    /// Like [`schedule`](Self::schedule) with a caller-built subscriber.
    pub fn schedule_subscriber<S: AsRef<str>>(
        &mut self,
        subscriber: Subscriber,
        paths: &[S],
    ) -> FsNoteResult<SubscriberId> {
        let spec = self.controller.prepare(&to_paths(paths))?;
        let key = paths[0].as_ref().to_string();

        let id = self.registry.register(key, subscriber)?;
        debug!(subscriber_id = %id, paths = ?spec.paths, "scheduled");
        self.scheduled = Some(spec);
        Ok(id)
    }

    /// Registers `sink` for `path` without touching the scheduled stream.
    pub fn register(&self, path: &str, sink: impl NotificationSink + 'static) -> FsNoteResult<SubscriberId> {
        self.registry.register(path, Subscriber::new(sink)).map_err(Into::into)
    }

    /// Registers a buffered stream of deliveries for `path`.
    pub fn subscribe_stream(&self, path: &str) -> FsNoteResult<DeliveryStream> {
        if path.is_empty() {
            return Err(ValidationError::EmptyPath { index: 0 }.into());
        }
        let id = SubscriberId::new();
        let (sink, stream) = stream::channel(id, self.controller.config().stream_capacity);
        self.registry.register(path, Subscriber::with_id(id, sink))?;
        Ok(stream)
    }

    /// Starts the scheduled stream.
    pub fn start(&mut self) -> FsNoteResult<StreamId> {
        let spec = self.scheduled.clone().ok_or(LifecycleError::NotScheduled)?;
        self.controller.start_with(spec)
    }

    /// Stops the active stream.
    pub fn stop(&mut self) -> FsNoteResult<()> {
        self.controller.stop_watch()
    }

    /// Shared registry, for registering from other threads.
    #[must_use]
    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        Arc::clone(&self.registry)
    }

    /// The stream controller.
    #[must_use]
    pub fn controller(&self) -> &StreamController {
        &self.controller
    }

    /// Mutable access to the stream controller.
    #[must_use]
    pub fn controller_mut(&mut self) -> &mut StreamController {
        &mut self.controller
    }

    /// Paths recorded by the last successful schedule.
    #[must_use]
    pub fn scheduled_paths(&self) -> Option<&[PathBuf]> {
        self.scheduled.as_ref().map(|spec| spec.paths.as_slice())
    }

    /// True while a stream is active.
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        self.controller.is_watching()
    }

    /// Description of the active stream, if any.
    #[must_use]
    pub fn status(&self) -> Option<StreamStatus> {
        self.controller.status()
    }

    /// Dispatch counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.controller.stats()
    }
}

fn to_paths<S: AsRef<str>>(paths: &[S]) -> Vec<PathBuf> {
    paths.iter().map(|p| PathBuf::from(p.as_ref())).collect()
}
