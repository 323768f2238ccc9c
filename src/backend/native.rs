//! Native filesystem backend built on the `notify` crate.
//!
//! `notify` reports one event per change with a semantic kind. Those are
//! mapped onto the FSEvents-style bits used everywhere else and coalesced
//! into batches over the stream latency, so the dispatch loop sees the same
//! shape of input on every platform.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, trace};

use crate::error::{DeviceError, ExecutionError, FsNoteError, FsNoteResult};
use crate::event::{EventBatch, RawEvent};
use crate::flags::{CreateFlags, EventFlags};

use super::{DeviceId, StreamSpec, WatchBackend, WatchHandle};

/// Bits describing the stream rather than an item.
const STREAM_LEVEL: EventFlags = EventFlags::MUST_SCAN_SUB_DIRS
    .union(EventFlags::USER_DROPPED)
    .union(EventFlags::KERNEL_DROPPED)
    .union(EventFlags::ROOT_CHANGED)
    .union(EventFlags::MOUNT)
    .union(EventFlags::UNMOUNT);

/// Watches the real filesystem, recursively, on every stream path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyBackend;

impl NotifyBackend {
    /// Creates the backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

struct NotifyHandle {
    watcher: Option<RecommendedWatcher>,
    batches: Receiver<EventBatch>,
}

impl WatchBackend for NotifyBackend {
    fn device_for_path(&self, path: &Path) -> Result<DeviceId, DeviceError> {
        super::device_for_path(path)
    }

    fn open(&self, spec: &StreamSpec) -> FsNoteResult<Box<dyn WatchHandle>> {
        let (raw_tx, raw_rx) = unbounded::<RawEvent>();
        let (batch_tx, batch_rx) = bounded::<EventBatch>(spec.queue_capacity.max(1));

        let roots: Vec<PathBuf> = spec.paths.iter().map(|p| canonical_root(p)).collect();
        let translator = Translator::new(roots.clone(), spec.flags);
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                for raw in translator.translate(&event) {
                    if raw_tx.send(raw).is_err() {
                        return;
                    }
                }
            }
            Err(e) => error!(?e, "filesystem watcher reported an error;"),
        })
        .map_err(|e| FsNoteError::backend(e.to_string()))?;

        for path in &roots {
            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(|e| FsNoteError::backend(format!("{}: {e}", path.display())))?;
        }

        let latency = spec.latency;
        thread::Builder::new()
            .name("fsnote-coalesce".to_string())
            .spawn(move || coalesce(&raw_rx, &batch_tx, latency))
            .map_err(|source| ExecutionError::Spawn { source })?;

        debug!(paths = ?spec.paths, device = %spec.device, ?latency, "native stream opened");

        Ok(Box::new(NotifyHandle {
            watcher: Some(watcher),
            batches: batch_rx,
        }))
    }
}

impl WatchHandle for NotifyHandle {
    fn events(&self) -> Receiver<EventBatch> {
        self.batches.clone()
    }

    fn stop(&mut self) {
        // Dropping the watcher drops its callback and with it the raw sender,
        // which lets the coalescer flush and exit.
        if self.watcher.take().is_some() {
            debug!("native stream stopped");
        }
    }
}

impl Drop for NotifyHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Groups raw events into batches: a batch opens on the first event and
/// closes once `latency` has elapsed.
fn coalesce(raw_rx: &Receiver<RawEvent>, batch_tx: &Sender<EventBatch>, latency: Duration) {
    while let Ok(first) = raw_rx.recv() {
        let deadline = Instant::now() + latency;
        let mut batch = vec![first];
        let mut closed = false;

        loop {
            match raw_rx.recv_deadline(deadline) {
                Ok(event) => batch.push(event),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }

        trace!(events = batch.len(), "flushing batch");
        if batch_tx.send(batch).is_err() || closed {
            return;
        }
    }
}

/// Events are reported under canonical paths; roots are compared in that form.
fn canonical_root(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Maps `notify` events onto [`EventFlags`].
struct Translator {
    roots: Vec<PathBuf>,
    flags: CreateFlags,
    next_id: AtomicU64,
}

impl Translator {
    fn new(roots: Vec<PathBuf>, flags: CreateFlags) -> Self {
        Self {
            roots: roots.iter().map(|root| canonical_root(root)).collect(),
            flags,
            next_id: AtomicU64::new(1),
        }
    }

    fn translate(&self, event: &Event) -> Vec<RawEvent> {
        let mut base = kind_flags(&event.kind);
        if event.need_rescan() {
            base |= EventFlags::MUST_SCAN_SUB_DIRS;
        }
        if base.is_empty() {
            return Vec::new();
        }

        event
            .paths
            .iter()
            .map(|path| {
                let mut flags = base;
                if !flags.contains(EventFlags::ITEM_REMOVED) && !has_type(flags) {
                    flags |= type_flags(path);
                }
                if self.flags.contains(CreateFlags::WATCH_ROOT)
                    && flags.intersects(EventFlags::ITEM_REMOVED | EventFlags::ITEM_RENAMED)
                    && self.roots.iter().any(|root| root == path)
                {
                    flags |= EventFlags::ROOT_CHANGED;
                }

                let (path, flags) = if self.flags.contains(CreateFlags::FILE_EVENTS) {
                    (path.as_path(), flags)
                } else {
                    (path.parent().unwrap_or(path), flags & STREAM_LEVEL)
                };

                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                RawEvent::new(id, path.to_string_lossy().into_owned(), flags)
            })
            .collect()
    }
}

fn has_type(flags: EventFlags) -> bool {
    flags.intersects(EventFlags::ITEM_IS_FILE | EventFlags::ITEM_IS_DIR | EventFlags::ITEM_IS_SYMLINK)
}

fn kind_flags(kind: &EventKind) -> EventFlags {
    match kind {
        EventKind::Create(create) => {
            EventFlags::ITEM_CREATED
                | match create {
                    CreateKind::File => EventFlags::ITEM_IS_FILE,
                    CreateKind::Folder => EventFlags::ITEM_IS_DIR,
                    _ => EventFlags::empty(),
                }
        }
        EventKind::Remove(remove) => {
            EventFlags::ITEM_REMOVED
                | match remove {
                    RemoveKind::File => EventFlags::ITEM_IS_FILE,
                    RemoveKind::Folder => EventFlags::ITEM_IS_DIR,
                    _ => EventFlags::empty(),
                }
        }
        EventKind::Modify(ModifyKind::Name(_)) => EventFlags::ITEM_RENAMED,
        EventKind::Modify(ModifyKind::Metadata(metadata)) => match metadata {
            MetadataKind::Ownership => EventFlags::ITEM_CHANGE_OWNER,
            MetadataKind::Extended => EventFlags::ITEM_XATTR_MOD,
            _ => EventFlags::ITEM_INODE_META_MOD,
        },
        EventKind::Modify(_) => EventFlags::ITEM_MODIFIED,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => EventFlags::empty(),
    }
}

fn type_flags(path: &Path) -> EventFlags {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => EventFlags::ITEM_IS_SYMLINK,
        Ok(meta) if meta.is_dir() => EventFlags::ITEM_IS_DIR,
        Ok(meta) if meta.is_file() => EventFlags::ITEM_IS_FILE,
        _ => EventFlags::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, DataChange, Flag, RenameMode};

    use crate::flags::decode;

    fn translate(flags: CreateFlags, event: Event) -> Vec<RawEvent> {
        Translator::new(vec![PathBuf::from("/watched")], flags).translate(&event)
    }

    #[test]
    fn create_file_maps_to_created_is_file() {
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/watched/a.txt"));
        let out = translate(CreateFlags::default(), event);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, "/watched/a.txt");
        assert_eq!(out[0].flags, EventFlags::ITEM_CREATED | EventFlags::ITEM_IS_FILE);
    }

    #[test]
    fn metadata_kinds() {
        assert_eq!(
            kind_flags(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Ownership))),
            EventFlags::ITEM_CHANGE_OWNER
        );
        assert_eq!(
            kind_flags(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Extended))),
            EventFlags::ITEM_XATTR_MOD
        );
        assert_eq!(
            kind_flags(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            EventFlags::ITEM_INODE_META_MOD
        );
        assert_eq!(
            kind_flags(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            EventFlags::ITEM_MODIFIED
        );
    }

    #[test]
    fn access_events_are_dropped() {
        let event = Event::new(EventKind::Access(AccessKind::Any)).add_path(PathBuf::from("/watched/a"));
        assert!(translate(CreateFlags::default(), event).is_empty());
    }

    #[test]
    fn rename_of_both_paths_yields_two_events() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/watched/old"))
            .add_path(PathBuf::from("/watched/new"));
        let out = translate(CreateFlags::default(), event);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.flags.contains(EventFlags::ITEM_RENAMED)));
        assert!(out[1].id > out[0].id);
    }

    #[test]
    fn removing_watched_root_sets_root_changed() {
        let event = Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(PathBuf::from("/watched"));
        let out = translate(CreateFlags::default(), event.clone());
        assert!(decode(out[0].flags).contains("RootChanged"));

        let out = translate(CreateFlags::FILE_EVENTS, event);
        assert!(!out[0].flags.contains(EventFlags::ROOT_CHANGED));
    }

    #[test]
    fn non_canonical_root_still_reports_root_changed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        std::fs::create_dir(&root).unwrap();
        let canonical = std::fs::canonicalize(&root).unwrap();

        let dotted = root.join("..").join("proj").join(".");
        let translator = Translator::new(vec![dotted], CreateFlags::default());
        let event = Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(canonical);
        let out = translator.translate(&event);
        assert!(out[0].flags.contains(EventFlags::ROOT_CHANGED));
    }

    #[test]
    fn rescan_sets_must_scan() {
        let event = Event::new(EventKind::Other).set_flag(Flag::Rescan).add_path(PathBuf::from("/watched"));
        let out = translate(CreateFlags::default(), event);
        assert_eq!(out.len(), 1);
        assert!(out[0].flags.contains(EventFlags::MUST_SCAN_SUB_DIRS));
    }

    #[test]
    fn directory_granular_reports_parent() {
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/watched/sub/a.txt"));
        let out = translate(CreateFlags::WATCH_ROOT, event);
        assert_eq!(out[0].path, "/watched/sub");
        assert!(out[0].flags.is_empty());
    }

    #[test]
    fn type_bits_come_from_disk_when_kind_is_vague() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();

        let event = Event::new(EventKind::Create(CreateKind::Any)).add_path(file);
        let out = Translator::new(vec![dir.path().to_path_buf()], CreateFlags::default()).translate(&event);
        assert_eq!(out[0].flags, EventFlags::ITEM_CREATED | EventFlags::ITEM_IS_FILE);
    }

    #[test]
    fn coalescer_batches_within_latency() {
        let (raw_tx, raw_rx) = unbounded();
        let (batch_tx, batch_rx) = bounded(4);
        raw_tx.send(RawEvent::new(1, "/a", EventFlags::ITEM_CREATED)).unwrap();
        raw_tx.send(RawEvent::new(2, "/b", EventFlags::ITEM_CREATED)).unwrap();
        drop(raw_tx);

        coalesce(&raw_rx, &batch_tx, Duration::from_millis(50));

        let batch = batch_rx.try_recv().unwrap();
        assert_eq!(batch.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(batch_rx.try_recv().is_err());
    }
}
