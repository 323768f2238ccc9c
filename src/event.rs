//! Raw change events as produced by a watch backend.

use serde::{Deserialize, Serialize};

use crate::flags::{decode, EventFlags, Note};

/// A single change reported by the watch primitive.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Monotonically increasing id assigned by the backend.
    pub id: u64,
    /// Absolute path where the change occurred.
    pub path: String,
    pub flags: EventFlags,
}

impl RawEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(id: u64, path: impl Into<String>, flags: EventFlags) -> Self {
        Self {
            id,
            path: path.into(),
            flags,
        }
    }

    /// Renders this event's flags.
    #[must_use]
    pub fn note(&self) -> Note {
        decode(self.flags)
    }
}

/// Events delivered together by the backend, in backend order.
pub type EventBatch = Vec<RawEvent>;
