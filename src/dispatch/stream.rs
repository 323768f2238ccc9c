use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, FsNoteError, FsNoteResult};
use crate::flags::Note;

use super::subscriber::{NotificationSink, SinkError, SinkResult, SubscriberId};

/// One event as seen by a delivery stream.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub path: String,
    pub note: Note,
    pub received_at: DateTime<Utc>,
}

/// Sink half of a delivery stream.
///
/// Never blocks the dispatch loop: a full buffer drops the delivery.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Delivery>,
    dropped: Arc<AtomicU64>,
}

impl NotificationSink for ChannelSink {
    fn deliver(&self, path: &str, note: &Note) -> SinkResult {
        let delivery = Delivery {
            path: path.to_string(),
            note: note.clone(),
            received_at: Utc::now(),
        };
        match self.tx.try_send(delivery) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SinkError::Full)
            }
            Err(TrySendError::Disconnected(_)) => Err(SinkError::Disconnected),
        }
    }
}

/// A pull-based subscription for deliveries to one watched path.
#[derive(Debug)]
pub struct DeliveryStream {
    subscriber_id: SubscriberId,
    rx: Receiver<Delivery>,
    dropped: Arc<AtomicU64>,
}

/// Creates a connected sink/stream pair with the given buffer capacity.
#[must_use]
pub fn channel(subscriber_id: SubscriberId, capacity: usize) -> (ChannelSink, DeliveryStream) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let sink = ChannelSink {
        tx,
        dropped: Arc::clone(&dropped),
    };
    let stream = DeliveryStream {
        subscriber_id,
        rx,
        dropped,
    };
    (sink, stream)
}

impl DeliveryStream {
    /// The subscriber id backing this stream.
    #[must_use]
    pub const fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    /// Deliveries discarded because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Receive the next delivery (blocking).
    pub fn recv(&self) -> FsNoteResult<Delivery> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next delivery with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> FsNoteResult<Delivery> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => FsNoteError::Execution(ExecutionError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Returns a queued delivery without blocking.
    pub fn try_recv(&self) -> FsNoteResult<Option<Delivery>> {
        match self.rx.try_recv() {
            Ok(delivery) => Ok(Some(delivery)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// Drains the queued deliveries and returns each changed path once.
    ///
    /// Never blocks; an empty set means nothing changed since the last call.
    #[must_use]
    pub fn changed_paths(&self) -> BTreeSet<String> {
        self.rx.try_iter().map(|delivery| delivery.path).collect()
    }
}

fn disconnected() -> FsNoteError {
    FsNoteError::Execution(ExecutionError::Disconnected {
        path: "delivery_stream".to_string(),
    })
}
