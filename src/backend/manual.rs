use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::error::{DeviceError, ExecutionError, FsNoteError, FsNoteResult};
use crate::event::{EventBatch, RawEvent};
use crate::flags::EventFlags;

use super::{DeviceId, StreamSpec, WatchBackend, WatchHandle};

type Slot = Arc<Mutex<Option<OpenStream>>>;

#[derive(Debug)]
struct OpenStream {
    generation: u64,
    tx: Sender<EventBatch>,
}

/// Backend whose events are pushed in by an [`EventInjector`].
///
/// Device resolution checks the configured virtual mounts first and falls
/// back to filesystem metadata, so unknown paths fail the same way they do
/// on the native backend.
#[derive(Debug)]
pub struct ManualBackend {
    slot: Slot,
    generation: AtomicU64,
    mounts: Vec<(PathBuf, DeviceId)>,
}

/// Feeds batches into the stream currently open on a [`ManualBackend`].
#[derive(Debug, Clone)]
pub struct EventInjector {
    slot: Slot,
    next_id: Arc<AtomicU64>,
}

struct ManualHandle {
    generation: u64,
    rx: Receiver<EventBatch>,
    slot: Slot,
}

impl ManualBackend {
    /// Creates a backend and the injector that feeds it.
    #[must_use]
    pub fn new() -> (Self, EventInjector) {
        let slot: Slot = Arc::new(Mutex::new(None));
        let injector = EventInjector {
            slot: Arc::clone(&slot),
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (
            Self {
                slot,
                generation: AtomicU64::new(0),
                mounts: Vec::new(),
            },
            injector,
        )
    }

    /// Treats every path under `root` as living on `device`, whether or not it exists.
    #[must_use]
    pub fn with_mount(mut self, root: impl Into<PathBuf>, device: DeviceId) -> Self {
        self.mounts.push((root.into(), device));
        self
    }
}

impl WatchBackend for ManualBackend {
    fn device_for_path(&self, path: &Path) -> Result<DeviceId, DeviceError> {
        if let Some((_, device)) = self.mounts.iter().find(|(root, _)| path.starts_with(root)) {
            return Ok(*device);
        }
        super::device_for_path(path)
    }

    fn open(&self, spec: &StreamSpec) -> FsNoteResult<Box<dyn WatchHandle>> {
        let (tx, rx) = bounded(spec.queue_capacity.max(1));
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(FsNoteError::backend("manual backend already has an open stream"));
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        *slot = Some(OpenStream { generation, tx });
        debug!(paths = ?spec.paths, generation, "manual stream opened");

        Ok(Box::new(ManualHandle {
            generation,
            rx,
            slot: Arc::clone(&self.slot),
        }))
    }
}

impl WatchHandle for ManualHandle {
    fn events(&self) -> Receiver<EventBatch> {
        self.rx.clone()
    }

    fn stop(&mut self) {
        // Dropping the sender disconnects the stream. A stale handle must not
        // close a stream opened after it.
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|open| open.generation == self.generation) {
            slot.take();
        }
    }
}

impl Drop for ManualHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl EventInjector {
    /// Builds an event with the next id in sequence.
    pub fn event(&self, path: impl Into<String>, flags: EventFlags) -> RawEvent {
        RawEvent::new(self.next_id.fetch_add(1, Ordering::Relaxed), path, flags)
    }

    /// True while a stream is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Sends a batch to the open stream, blocking while its queue is full.
    pub fn send(&self, batch: EventBatch) -> FsNoteResult<()> {
        let tx = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|open| open.tx.clone())
            .ok_or_else(disconnected)?;
        tx.send(batch).map_err(|_| disconnected())
    }
}

fn disconnected() -> FsNoteError {
    FsNoteError::Execution(ExecutionError::Disconnected {
        path: "manual_stream".to_string(),
    })
}
