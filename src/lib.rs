//! # fsnote - filesystem change notifications routed to subscribers
//!
//! fsnote watches one or more filesystem paths, receives batches of raw change
//! events from a watch backend, decodes each event's flag bitmask into a
//! human-readable note, and delivers `(path, note)` to the callbacks registered
//! for the most specific watched path.
//!
//! ## Core Concepts
//!
//! - **Flags**: [`EventFlags`] bitmask decoded into a [`Note`] such as `"Created IsFile"`
//! - **Registry**: [`SubscriptionRegistry`] maps a watched path to its subscribers
//! - **Routing**: the registered path leaving the shortest unmatched remainder wins
//! - **Controller**: [`StreamController`] owns one stream and its dispatch thread
//! - **Context**: [`WatchContext`] ties the pieces together for embedders
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fsnote::{sink_fn, WatchConfig, WatchContext};
//!
//! let mut ctx = WatchContext::native(WatchConfig::default());
//! ctx.schedule(
//!     sink_fn(|path, note| {
//!         println!("{path}: {note}");
//!         Ok(())
//!     }),
//!     &["/tmp/project"],
//! )?;
//! ctx.start()?;
//! // ...
//! ctx.stop()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod error;
pub mod event;
pub mod flags;

// Event sources
pub mod backend;

// Routing and delivery
pub mod context;
pub mod dispatch;

pub use config::{WatchConfig, DEFAULT_LATENCY};
pub use error::{DeviceError, ExecutionError, FsNoteError, FsNoteResult, LifecycleError, ValidationError};
pub use event::{EventBatch, RawEvent};
pub use flags::{decode, CreateFlags, EventFlags, Note};

pub use backend::{DeviceId, EventInjector, ManualBackend, StreamSpec, WatchBackend, WatchHandle};
#[cfg(feature = "native")]
pub use backend::NotifyBackend;

pub use context::WatchContext;
pub use dispatch::{
    sink_fn, Delivery, DeliveryStream, DispatchStats, EventRouter, NotificationSink, PatternSink, SinkError,
    SinkResult, SpecificityRouter, StreamController, StreamId, StreamStatus, Subscriber, SubscriberId,
    SubscriptionRegistry,
};
