//! Event dispatch: who is subscribed, who wins an event, and the loop that delivers it.
//!
//! Subscribers register a sink under a path in the [`SubscriptionRegistry`].
//! The [`StreamController`] runs one watch stream at a time and, for every
//! event, hands the decoded note to the subscribers of the most specific
//! registered path chosen by the [`EventRouter`].

/// Stream lifecycle and dispatch worker.
pub mod controller;
/// Pattern-filtering sink adapter.
pub mod filter;
/// Copy-on-write path to subscriber map.
pub mod registry;
/// Most-specific-path routing.
pub mod router;
/// Buffered delivery streams.
pub mod stream;
/// Sink trait and subscriber handles.
pub mod subscriber;

pub use controller::{DispatchStats, StreamController, StreamId, StreamStatus};
pub use filter::{PatternSink, DEFAULT_WATCHED_EXTENSIONS};
pub use registry::{RegistrySnapshot, SubscriptionRegistry};
pub use router::{route, EventRouter, RouteMatch, SpecificityRouter, MAX_REMAINDER};
pub use stream::{ChannelSink, Delivery, DeliveryStream};
pub use subscriber::{sink_fn, FnSink, NotificationSink, SinkError, SinkResult, Subscriber, SubscriberId};
