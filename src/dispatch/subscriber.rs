//! Subscriber handles and the notification sink capability.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::flags::Note;

/// Unique identifier for a registered subscriber.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Create a new random subscriber id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Failure reported by a sink. The dispatch loop logs it and moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink rejected delivery: {message}")]
    Rejected { message: String },

    #[error("sink buffer is full")]
    Full,

    #[error("sink receiver is gone")]
    Disconnected,
}

impl SinkError {
    /// Creates a rejection with a message.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Result returned by [`NotificationSink::deliver`].
pub type SinkResult = Result<(), SinkError>;

/// Receives `(path, note)` pairs for the paths it is registered under.
///
/// Implementations run on the dispatch thread and block it while they run.
pub trait NotificationSink: Send + Sync {
    /// Handles one event.
    fn deliver(&self, path: &str, note: &Note) -> SinkResult;
}

impl<S: NotificationSink + ?Sized> NotificationSink for Arc<S> {
    fn deliver(&self, path: &str, note: &Note) -> SinkResult {
        (**self).deliver(path, note)
    }
}

/// Adapts a closure into a [`NotificationSink`].
pub struct FnSink<F>(F);

impl<F> NotificationSink for FnSink<F>
where
    F: Fn(&str, &Note) -> SinkResult + Send + Sync,
{
    fn deliver(&self, path: &str, note: &Note) -> SinkResult {
        (self.0)(path, note)
    }
}

/// Wraps `f` as a sink.
pub fn sink_fn<F>(f: F) -> FnSink<F>
where
    F: Fn(&str, &Note) -> SinkResult + Send + Sync,
{
    FnSink(f)
}

/// A registered sink together with its id.
///
/// Cloning shares the sink; the registry keeps one clone alive per registration.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    sink: Arc<dyn NotificationSink>,
}

impl Subscriber {
    /// Wraps `sink` under a fresh id.
    #[must_use]
    pub fn new(sink: impl NotificationSink + 'static) -> Self {
        Self::from_arc(Arc::new(sink))
    }

    /// Wraps an already shared sink under a fresh id.
    #[must_use]
    pub fn from_arc(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            id: SubscriberId::new(),
            sink,
        }
    }

    /// Builds a subscriber under an id chosen by the caller.
    #[must_use]
    pub fn with_id(id: SubscriberId, sink: impl NotificationSink + 'static) -> Self {
        Self {
            id,
            sink: Arc::new(sink),
        }
    }

    /// The subscriber's id.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Delivers one event to the underlying sink.
    pub fn deliver(&self, path: &str, note: &Note) -> SinkResult {
        self.sink.deliver(path, note)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish_non_exhaustive()
    }
}
