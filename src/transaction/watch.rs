// Watch index - bidirectional client <-> key tracking for WATCH/UNWATCH

use bytes::Bytes;
use std::collections::{HashMap, HashSet};

/// Stable handle identifying a client session. Session ids are allocated
/// monotonically and never reused, so a stale id can never alias a live
/// client.
pub type ClientId = u64;

/// Tracks which clients are watching which keys, per database.
///
/// The index is bidirectional: the store's mutation hook needs the
/// key -> watchers direction on the hot path of every write, while
/// UNWATCH and client disconnect need the client -> keys direction so
/// cleanup costs O(watched keys) instead of a full scan.
///
/// A client whose watched key was modified is recorded in `dirty`; the
/// bit survives until the client's watches are dropped (UNWATCH, EXEC,
/// DISCARD or disconnect). In particular it survives entering MULTI:
/// a modification between WATCH and MULTI still taints the transaction.
#[derive(Debug)]
pub struct WatchIndex {
    /// Per-database map from key to the clients watching it, in watch order.
    watchers: Vec<HashMap<Bytes, Vec<ClientId>>>,
    /// Reverse map: every (db, key) pair a client currently watches.
    clients: HashMap<ClientId, HashSet<(usize, Bytes)>>,
    /// Clients with at least one watched key modified since WATCH.
    dirty: HashSet<ClientId>,
}

impl WatchIndex {
    pub fn new(num_databases: usize) -> Self {
        Self {
            watchers: vec![HashMap::new(); num_databases],
            clients: HashMap::new(),
            dirty: HashSet::new(),
        }
    }

    /// Register `client` as a watcher of `(db, key)`.
    ///
    /// Watching the same key twice from the same client is a no-op, so
    /// the per-key watcher list never holds duplicates and the relative
    /// order of distinct watchers is preserved.
    pub fn watch(&mut self, client: ClientId, db: usize, key: Bytes) {
        let Some(keys) = self.watchers.get_mut(db) else {
            return;
        };

        let watched = self.clients.entry(client).or_default();
        if !watched.insert((db, key.clone())) {
            return;
        }

        keys.entry(key).or_default().push(client);
    }

    /// Drop every watch held by `client` and clear its CAS-dirty bit.
    ///
    /// Per-key watcher lists that become empty are removed so the index
    /// never retains keys nobody watches.
    pub fn unwatch_all(&mut self, client: ClientId) {
        self.dirty.remove(&client);

        let Some(watched) = self.clients.remove(&client) else {
            return;
        };

        for (db, key) in watched {
            let Some(keys) = self.watchers.get_mut(db) else {
                continue;
            };
            if let Some(ids) = keys.get_mut(&key) {
                ids.retain(|id| *id != client);
                if ids.is_empty() {
                    keys.remove(&key);
                }
            }
        }
    }

    /// Mark every client watching `(db, key)` as CAS-dirty.
    ///
    /// Called by the store's mutation hook before a write returns. The
    /// index itself is left untouched; only the dirty set changes.
    pub fn touch(&mut self, db: usize, key: &[u8]) {
        let Some(keys) = self.watchers.get(db) else {
            return;
        };
        if let Some(ids) = keys.get(key) {
            self.dirty.extend(ids.iter().copied());
        }
    }

    /// Mark watchers ahead of a database flush.
    ///
    /// `db` of `None` means all databases are being flushed. Only keys
    /// that currently exist taint their watchers: a flush that removes
    /// nothing a watcher cared about is not a modification. The caller
    /// must invoke this *before* removing entries so the existence test
    /// is accurate.
    pub fn touch_on_flush<F>(&mut self, db: Option<usize>, key_exists: F)
    where
        F: Fn(usize, &[u8]) -> bool,
    {
        for (client, watched) in &self.clients {
            for (key_db, key) in watched {
                if let Some(flushed) = db {
                    if *key_db != flushed {
                        continue;
                    }
                }
                if key_exists(*key_db, key) {
                    self.dirty.insert(*client);
                    break;
                }
            }
        }
    }

    /// Whether a watched key of `client` was modified since WATCH.
    pub fn is_dirty(&self, client: ClientId) -> bool {
        self.dirty.contains(&client)
    }

    /// Number of keys `client` currently watches.
    pub fn watched_count(&self, client: ClientId) -> usize {
        self.clients.get(&client).map_or(0, |keys| keys.len())
    }

    /// Number of clients currently watching `(db, key)`.
    pub fn watcher_count(&self, db: usize, key: &[u8]) -> usize {
        self.watchers
            .get(db)
            .and_then(|keys| keys.get(key))
            .map_or(0, |ids| ids.len())
    }

    /// Total number of watched (db, key) entries across all databases.
    pub fn total_watched_keys(&self) -> usize {
        self.watchers.iter().map(|keys| keys.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn index() -> WatchIndex {
        WatchIndex::new(16)
    }

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    /// Both directions of the index must agree, and no per-key watcher
    /// list may be empty.
    fn assert_consistent(index: &WatchIndex) {
        for (db, keys) in index.watchers.iter().enumerate() {
            for (k, ids) in keys {
                assert!(!ids.is_empty(), "empty watcher list for {:?}", k);
                for id in ids {
                    let watched = index.clients.get(id).expect("missing reverse entry");
                    assert!(watched.contains(&(db, k.clone())));
                }
            }
        }
        for (client, watched) in &index.clients {
            for (db, k) in watched {
                let ids = index.watchers[*db].get(k).expect("missing forward entry");
                assert!(ids.contains(client));
            }
        }
    }

    #[test]
    fn test_watch_and_unwatch() {
        let mut idx = index();
        idx.watch(1, 0, key("a"));
        idx.watch(1, 0, key("b"));
        idx.watch(2, 0, key("a"));

        assert_eq!(idx.watched_count(1), 2);
        assert_eq!(idx.watcher_count(0, b"a"), 2);
        assert_consistent(&idx);

        idx.unwatch_all(1);
        assert_eq!(idx.watched_count(1), 0);
        assert_eq!(idx.watcher_count(0, b"a"), 1);
        assert_eq!(idx.watcher_count(0, b"b"), 0);
        assert_consistent(&idx);

        idx.unwatch_all(2);
        assert_eq!(idx.total_watched_keys(), 0);
    }

    #[test]
    fn test_duplicate_watch_is_noop() {
        let mut idx = index();
        idx.watch(1, 0, key("a"));
        idx.watch(1, 0, key("a"));

        assert_eq!(idx.watched_count(1), 1);
        assert_eq!(idx.watcher_count(0, b"a"), 1);
    }

    #[test]
    fn test_same_key_different_db() {
        let mut idx = index();
        idx.watch(1, 0, key("a"));
        idx.watch(1, 3, key("a"));

        assert_eq!(idx.watched_count(1), 2);

        idx.touch(3, b"a");
        assert!(idx.is_dirty(1));
    }

    #[test]
    fn test_touch_marks_all_watchers() {
        let mut idx = index();
        idx.watch(1, 0, key("a"));
        idx.watch(2, 0, key("a"));
        idx.watch(3, 0, key("b"));

        idx.touch(0, b"a");

        assert!(idx.is_dirty(1));
        assert!(idx.is_dirty(2));
        assert!(!idx.is_dirty(3));
        // Structure unchanged: touch taints, it does not unwatch.
        assert_eq!(idx.watcher_count(0, b"a"), 2);
        assert_consistent(&idx);
    }

    #[test]
    fn test_touch_unwatched_key() {
        let mut idx = index();
        idx.watch(1, 0, key("a"));
        idx.touch(0, b"other");
        assert!(!idx.is_dirty(1));
    }

    #[test]
    fn test_unwatch_clears_dirty() {
        let mut idx = index();
        idx.watch(1, 0, key("a"));
        idx.touch(0, b"a");
        assert!(idx.is_dirty(1));

        idx.unwatch_all(1);
        assert!(!idx.is_dirty(1));
    }

    #[test]
    fn test_touch_on_flush_existing_key_only() {
        let mut idx = index();
        idx.watch(1, 0, key("present"));
        idx.watch(2, 0, key("missing"));

        idx.touch_on_flush(Some(0), |_, k| k == b"present");

        assert!(idx.is_dirty(1));
        assert!(!idx.is_dirty(2));
    }

    #[test]
    fn test_touch_on_flush_db_filter() {
        let mut idx = index();
        idx.watch(1, 0, key("a"));
        idx.watch(2, 1, key("a"));

        idx.touch_on_flush(Some(1), |_, _| true);
        assert!(!idx.is_dirty(1));
        assert!(idx.is_dirty(2));

        idx.touch_on_flush(None, |_, _| true);
        assert!(idx.is_dirty(1));
    }

    #[test]
    fn test_watcher_order_preserved() {
        let mut idx = index();
        idx.watch(7, 0, key("a"));
        idx.watch(3, 0, key("a"));
        idx.watch(9, 0, key("a"));

        assert_eq!(idx.watchers[0][&key("a")], vec![7, 3, 9]);

        idx.unwatch_all(3);
        assert_eq!(idx.watchers[0][&key("a")], vec![7, 9]);
    }

    proptest! {
        /// Random interleavings of watch/unwatch/touch keep the two
        /// sides of the index consistent, never retain an empty watcher
        /// list, and never hold duplicate watches for a client.
        #[test]
        fn prop_index_stays_consistent(ops in prop::collection::vec(
            (0u8..4, 0u64..5, 0usize..3, "[a-d]"),
            0..64,
        )) {
            let mut idx = WatchIndex::new(3);
            for (op, client, db, k) in ops {
                let k = Bytes::copy_from_slice(k.as_bytes());
                match op {
                    0 | 1 => idx.watch(client, db, k),
                    2 => idx.unwatch_all(client),
                    _ => idx.touch(db, &k),
                }
                assert_consistent(&idx);
                // No per-key watcher list ever holds the same client twice.
                for keys in &idx.watchers {
                    for ids in keys.values() {
                        let mut seen = HashSet::new();
                        for id in ids {
                            assert!(seen.insert(*id), "duplicate watcher {}", id);
                        }
                    }
                }
            }
        }

        /// After unwatch_all a client is fully gone from the index.
        #[test]
        fn prop_unwatch_all_is_complete(ops in prop::collection::vec(
            (0u64..4, 0usize..3, "[a-d]"),
            0..32,
        )) {
            let mut idx = WatchIndex::new(3);
            for (client, db, k) in &ops {
                idx.watch(*client, *db, Bytes::copy_from_slice(k.as_bytes()));
            }
            for client in 0..4 {
                idx.unwatch_all(client);
                assert_eq!(idx.watched_count(client), 0);
                assert!(!idx.is_dirty(client));
                for keys in &idx.watchers {
                    for ids in keys.values() {
                        assert!(!ids.contains(&client));
                    }
                }
            }
            assert_eq!(idx.total_watched_keys(), 0);
        }
    }
}
