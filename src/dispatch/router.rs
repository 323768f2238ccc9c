//! Event routing: picks which registered path receives an event.

use super::registry::RegistrySnapshot;
use super::subscriber::Subscriber;

/// Remainders at or above this length never match.
pub const MAX_REMAINDER: usize = 200;

/// The winning registry entry for an event.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'a> {
    /// Registered path that won.
    pub watched_path: &'a str,
    /// Its subscribers, in registration order.
    pub subscribers: &'a [Subscriber],
    /// Length of the event path once `watched_path` was removed from it.
    pub remainder: usize,
}

/// Selects the registry entry that should receive an event.
pub trait EventRouter: Send + Sync {
    /// Returns the winning entry for `path`, or `None` if nothing qualifies.
    fn route<'a>(&self, path: &str, snapshot: &'a RegistrySnapshot) -> Option<RouteMatch<'a>>;
}

/// Closest-specific-path router.
///
/// For each registered path `k` the score is the byte length of the event
/// path with the first occurrence of `k` removed (the full length if `k` does
/// not occur). The strictly smallest score below [`MAX_REMAINDER`] wins and
/// ties keep the entry visited first. This is a substring heuristic, not a
/// prefix match: a registered path that does not occur in the event path at
/// all still wins when nothing scores lower and the event path is short.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpecificityRouter;

impl EventRouter for SpecificityRouter {
    fn route<'a>(&self, path: &str, snapshot: &'a RegistrySnapshot) -> Option<RouteMatch<'a>> {
        let mut best_distance = MAX_REMAINDER;
        let mut best = None;

        for (watched_path, subscribers) in snapshot.iter() {
            let remainder = remainder_len(path, watched_path);
            if remainder < best_distance {
                best_distance = remainder;
                best = Some(RouteMatch {
                    watched_path,
                    subscribers,
                    remainder,
                });
            }
        }

        best
    }
}

/// Byte length of `path` after removing the first occurrence of `key`.
#[must_use]
pub fn remainder_len(path: &str, key: &str) -> usize {
    if path.contains(key) {
        path.len() - key.len()
    } else {
        path.len()
    }
}

/// Subscribers that should receive an event at `path`, using [`SpecificityRouter`].
#[must_use]
pub fn route(path: &str, snapshot: &RegistrySnapshot) -> Vec<Subscriber> {
    SpecificityRouter
        .route(path, snapshot)
        .map(|m| m.subscribers.to_vec())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::registry::SubscriptionRegistry;
    use crate::dispatch::subscriber::{sink_fn, SubscriberId};

    fn registry_with(paths: &[&str]) -> (SubscriptionRegistry, Vec<SubscriberId>) {
        let registry = SubscriptionRegistry::new();
        let ids = paths
            .iter()
            .map(|p| registry.register(*p, Subscriber::new(sink_fn(|_, _| Ok(())))).unwrap())
            .collect();
        (registry, ids)
    }

    #[test]
    fn remainder_matches_first_occurrence_removal() {
        for (path, key) in [("/a/b/c.txt", "/a/b"), ("/a/a/a", "/a"), ("/x", "/y"), ("/x", "")] {
            assert_eq!(remainder_len(path, key), path.replacen(key, "", 1).len());
        }
    }

    #[test]
    fn deeper_path_wins() {
        let (registry, ids) = registry_with(&["/a", "/a/b"]);
        let selected = route("/a/b/c.txt", &registry.lookup());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id(), ids[1]);
    }

    #[test]
    fn route_match_reports_winner() {
        let (registry, _) = registry_with(&["/a", "/a/b"]);
        let snapshot = registry.lookup();
        let m = SpecificityRouter.route("/a/b/c.txt", &snapshot).unwrap();
        assert_eq!(m.watched_path, "/a/b");
        assert_eq!(m.remainder, "/c.txt".len());
    }

    #[test]
    fn long_unrelated_path_hits_ceiling() {
        let (registry, _) = registry_with(&["/watched"]);
        let path = format!("/elsewhere/{}", "x".repeat(MAX_REMAINDER));
        assert!(path.len() >= MAX_REMAINDER);
        assert!(route(&path, &registry.lookup()).is_empty());
    }

    #[test]
    fn remainder_of_exactly_ceiling_does_not_match() {
        let (registry, _) = registry_with(&["/w"]);
        let path = format!("/w{}", "y".repeat(MAX_REMAINDER));
        assert_eq!(remainder_len(&path, "/w"), MAX_REMAINDER);
        assert!(route(&path, &registry.lookup()).is_empty());

        let path = format!("/w{}", "y".repeat(MAX_REMAINDER - 1));
        assert_eq!(route(&path, &registry.lookup()).len(), 1);
    }

    #[test]
    fn long_path_under_watched_root_still_matches() {
        let root = format!("/{}", "r".repeat(150));
        let (registry, ids) = registry_with(&[root.as_str()]);
        let path = format!("{root}/{}", "f".repeat(100));
        let selected = route(&path, &registry.lookup());
        assert_eq!(selected[0].id(), ids[0]);
    }

    #[test]
    fn unrelated_path_wins_for_short_events() {
        let (registry, ids) = registry_with(&["/other"]);
        let selected = route("/tmp/x", &registry.lookup());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id(), ids[0]);
    }

    #[test]
    fn ties_keep_first_in_lexicographic_order() {
        // Neither occurs in the event path, so both score the full length.
        let (registry, ids) = registry_with(&["/q", "/p"]);
        let selected = route("/tmp/file", &registry.lookup());
        assert_eq!(selected[0].id(), ids[1]);
    }

    #[test]
    fn substring_not_prefix() {
        let (registry, ids) = registry_with(&["/project", "cache"]);
        let selected = route("/project/build/cache/blob.bin", &registry.lookup());
        // "/project" removes 8 bytes, "cache" removes 5.
        assert_eq!(selected[0].id(), ids[0]);
    }

    #[test]
    fn empty_registry_routes_nowhere() {
        let registry = SubscriptionRegistry::new();
        assert!(route("/a", &registry.lookup()).is_empty());
    }

    #[test]
    fn all_subscribers_of_winner_are_returned() {
        let registry = SubscriptionRegistry::new();
        let a = registry.register("/a", Subscriber::new(sink_fn(|_, _| Ok(())))).unwrap();
        let b = registry.register("/a", Subscriber::new(sink_fn(|_, _| Ok(())))).unwrap();
        registry.register("/", Subscriber::new(sink_fn(|_, _| Ok(())))).unwrap();

        let ids: Vec<_> = route("/a/file", &registry.lookup()).iter().map(Subscriber::id).collect();
        assert_eq!(ids, vec![a, b]);
    }
}
