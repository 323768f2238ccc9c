//! Subscriber registry keyed by watched path.
//!
//! Registration is append-only. Readers take an immutable snapshot and route
//! against it without holding any lock, so sinks may register new subscribers
//! while the dispatch loop is running.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::error::ValidationError;

use super::subscriber::{Subscriber, SubscriberId};

type PathMap = BTreeMap<String, Vec<Subscriber>>;

/// Point-in-time view of the registry.
///
/// Entries iterate in lexicographic path order.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    entries: Arc<PathMap>,
}

impl RegistrySnapshot {
    /// Iterates over `(watched path, subscribers)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Subscriber])> {
        self.entries.iter().map(|(path, subs)| (path.as_str(), subs.as_slice()))
    }

    /// Subscribers registered for exactly `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&[Subscriber]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    /// Number of distinct watched paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no path is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[allow(missing_docs)]
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<Arc<PathMap>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `subscriber` to the list for `path`.
    ///
    /// The same subscriber may be registered more than once and is then
    /// invoked once per registration. An empty path is rejected.
    pub fn register(&self, path: impl Into<String>, subscriber: Subscriber) -> Result<SubscriberId, ValidationError> {
        let path = path.into();
        if path.is_empty() {
            return Err(ValidationError::EmptyPath { index: 0 });
        }
        let id = subscriber.id();

        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: PathMap = (**guard).clone();
        let subs = next.entry(path).or_default();
        subs.push(subscriber);
        trace!(subscriber_id = %id, subscribers = subs.len(), "registered subscriber");
        *guard = Arc::new(next);

        Ok(id)
    }

    /// Returns every registered path with its subscribers.
    #[must_use]
    pub fn lookup(&self) -> RegistrySnapshot {
        let guard = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        RegistrySnapshot {
            entries: Arc::clone(&guard),
        }
    }

    /// Subscribers registered for exactly `path`, in registration order.
    #[must_use]
    pub fn subscribers_for(&self, path: &str) -> Vec<Subscriber> {
        self.lookup().get(path).map(<[Subscriber]>::to_vec).unwrap_or_default()
    }

    /// Registered paths in lexicographic order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.lookup().iter().map(|(path, _)| path.to_string()).collect()
    }

    /// Number of distinct watched paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lookup().len()
    }

    /// True if no path is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookup().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::subscriber::sink_fn;

    fn noop() -> Subscriber {
        Subscriber::new(sink_fn(|_, _| Ok(())))
    }

    #[test]
    fn empty_registry_has_no_candidates() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.lookup().iter().count(), 0);
        assert!(registry.subscribers_for("/a").is_empty());
    }

    #[test]
    fn register_then_lookup() {
        let registry = SubscriptionRegistry::new();
        let sub = noop();
        let id = registry.register("/a", sub).unwrap();

        let snapshot = registry.lookup();
        let subs = snapshot.get("/a").unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id(), id);
    }

    #[test]
    fn preserves_insertion_order_per_path() {
        let registry = SubscriptionRegistry::new();
        let first = registry.register("/a", noop()).unwrap();
        let second = registry.register("/a", noop()).unwrap();
        let third = registry.register("/a", noop()).unwrap();

        let ids: Vec<_> = registry.subscribers_for("/a").iter().map(Subscriber::id).collect();
        assert_eq!(ids, vec![first, second, third]);
    }

    #[test]
    fn duplicate_registration_is_kept() {
        let registry = SubscriptionRegistry::new();
        let sub = noop();
        registry.register("/a", sub.clone()).unwrap();
        registry.register("/a", sub.clone()).unwrap();

        let subs = registry.subscribers_for("/a");
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].id(), sub.id());
        assert_eq!(subs[1].id(), sub.id());
    }

    #[test]
    fn snapshot_is_not_affected_by_later_registration() {
        let registry = SubscriptionRegistry::new();
        registry.register("/a", noop()).unwrap();
        let before = registry.lookup();

        registry.register("/b", noop()).unwrap();
        registry.register("/a", noop()).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(before.get("/a").unwrap().len(), 1);
        assert_eq!(registry.lookup().len(), 2);
    }

    #[test]
    fn paths_iterate_lexicographically() {
        let registry = SubscriptionRegistry::new();
        registry.register("/z", noop()).unwrap();
        registry.register("/a/b", noop()).unwrap();
        registry.register("/a", noop()).unwrap();
        assert_eq!(registry.paths(), vec!["/a", "/a/b", "/z"]);
    }

    #[test]
    fn empty_path_is_rejected() {
        let registry = SubscriptionRegistry::new();
        let err = registry.register("", noop()).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyPath { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_registration() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        registry.register(format!("/p{}", i % 2), noop()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.subscribers_for("/p0").len(), 100);
        assert_eq!(registry.subscribers_for("/p1").len(), 100);
    }
}
