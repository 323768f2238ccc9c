//! Watch backends: the primitive that turns filesystem activity into event batches.
//!
//! The dispatch machinery only sees [`WatchBackend`] and [`WatchHandle`].
//! [`ManualBackend`] lets the embedder feed batches itself; `NotifyBackend`
//! (feature `native`) watches the real filesystem through the `notify` crate.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, FsNoteResult};
use crate::event::EventBatch;
use crate::flags::CreateFlags;

/// Manually fed backend.
pub mod manual;
/// `notify`-based backend.
#[cfg(feature = "native")]
pub mod native;

pub use manual::{EventInjector, ManualBackend};
#[cfg(feature = "native")]
pub use native::NotifyBackend;

/// OS identifier of the volume backing a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Everything a backend needs to open a stream.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub paths: Vec<PathBuf>,
    /// Device of the first path.
    pub device: DeviceId,
    /// Coalescing window.
    pub latency: Duration,
    pub flags: CreateFlags,
    /// Max queued batches before the backend blocks.
    pub queue_capacity: usize,
}

/// A running stream opened by a backend.
pub trait WatchHandle: Send {
    /// Channel of event batches. Disconnects once the stream is stopped.
    fn events(&self) -> Receiver<EventBatch>;

    /// Stops producing events and releases the OS resources. Idempotent.
    fn stop(&mut self);
}

/// Source of event streams.
pub trait WatchBackend: Send + Sync {
    /// Resolves the device backing `path`.
    fn device_for_path(&self, path: &Path) -> Result<DeviceId, DeviceError>;

    /// Opens a stream for `spec`.
    fn open(&self, spec: &StreamSpec) -> FsNoteResult<Box<dyn WatchHandle>>;
}

/// Resolves a device from filesystem metadata.
pub fn device_for_path(path: &Path) -> Result<DeviceId, DeviceError> {
    let metadata = std::fs::metadata(path).map_err(|e| DeviceError::from_io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(DeviceId(metadata.dev()))
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        Ok(DeviceId(0))
    }
}

/// Resolves `paths` to absolute paths with symlinks and `.`/`..` removed.
///
/// Native backends report events under canonical paths, so registry keys
/// and stream roots built from user input should go through this first.
pub fn canonicalize_paths<S: AsRef<str>>(paths: &[S]) -> Result<Vec<String>, DeviceError> {
    paths
        .iter()
        .map(|raw| {
            let path = Path::new(raw.as_ref());
            let canonical = std::fs::canonicalize(path).map_err(|e| DeviceError::from_io(path, e))?;
            Ok(canonical.to_string_lossy().into_owned())
        })
        .collect()
}
