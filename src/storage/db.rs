// Keyspace implementation

use crate::transaction::watch::{ClientId, WatchIndex};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A single logical database: raw maps only, no notification logic.
/// All mutation hooks live in [`Keyspace`], so no write path can reach
/// the maps without the watch index hearing about it.
#[derive(Debug, Default)]
struct DbInstance {
    /// Main key-value storage
    data: DashMap<Bytes, Bytes>,
    /// Expiration timestamps in milliseconds (key -> expiration_time_ms)
    expires: DashMap<Bytes, u64>,
}

impl DbInstance {
    fn new() -> Self {
        Self::default()
    }

    /// Remove the key if its expiration has passed. Returns true when a
    /// key was actually removed.
    fn purge_expired(&self, key: &[u8]) -> bool {
        let expired = match self.expires.get(key) {
            Some(entry) => current_timestamp_ms() >= *entry.value(),
            None => false,
        };
        if expired {
            self.data.remove(key);
            self.expires.remove(key);
        }
        expired
    }

    /// Read-only liveness test: present and not past its expiration.
    /// Used where removal (and therefore the mutation hook) must not run,
    /// e.g. the flush-time existence check.
    fn logically_exists(&self, key: &[u8]) -> bool {
        if !self.data.contains_key(key) {
            return false;
        }
        match self.expires.get(key) {
            Some(entry) => current_timestamp_ms() < *entry.value(),
            None => true,
        }
    }

    fn clear(&self) {
        self.data.clear();
        self.expires.clear();
    }
}

/// The server keyspace: a fixed set of logical databases plus the watch
/// index that backs WATCH/UNWATCH.
///
/// Every mutating method runs the watcher `touch` for the affected key
/// before returning, and the flush methods run the flush-touch *before*
/// removing entries — that ordering is what lets the flush hook test
/// whether a watched key actually existed.
///
/// The watch index sits behind a `Mutex` purely for interior mutability:
/// all callers already hold the server's command gate, so the lock is
/// never contended.
#[derive(Debug)]
pub struct Keyspace {
    dbs: Vec<DbInstance>,
    watch: Mutex<WatchIndex>,
}

impl Keyspace {
    pub fn new(num_databases: usize) -> Self {
        let mut dbs = Vec::with_capacity(num_databases);
        for _ in 0..num_databases {
            dbs.push(DbInstance::new());
        }
        Self {
            dbs,
            watch: Mutex::new(WatchIndex::new(num_databases)),
        }
    }

    pub fn num_databases(&self) -> usize {
        self.dbs.len()
    }

    fn touch(&self, db: usize, key: &[u8]) {
        self.watch.lock().unwrap().touch(db, key);
    }

    /// Look up a key, expiring it lazily. Lazy expiration is a
    /// modification: watchers of the expired key are tainted.
    pub fn get(&self, db: usize, key: &[u8]) -> Option<Bytes> {
        if self.dbs[db].purge_expired(key) {
            self.touch(db, key);
            return None;
        }
        self.dbs[db].data.get(key).map(|v| v.value().clone())
    }

    /// Set a key. Any previous expiration is discarded unless
    /// `keep_ttl` is set (SET ... KEEPTTL, and in-place updates such as
    /// INCR or APPEND).
    pub fn set(&self, db: usize, key: Bytes, value: Bytes, keep_ttl: bool) {
        if !keep_ttl {
            self.dbs[db].expires.remove(&key);
        }
        self.dbs[db].data.insert(key.clone(), value);
        self.touch(db, &key);
    }

    /// Set a key together with an absolute expiration in milliseconds.
    pub fn set_with_expiry(&self, db: usize, key: Bytes, value: Bytes, expire_at_ms: u64) {
        self.dbs[db].data.insert(key.clone(), value);
        self.dbs[db].expires.insert(key.clone(), expire_at_ms);
        self.touch(db, &key);
    }

    /// Delete a key. Returns true when the key existed.
    pub fn delete(&self, db: usize, key: &[u8]) -> bool {
        if self.dbs[db].purge_expired(key) {
            self.touch(db, key);
            return false;
        }
        self.dbs[db].expires.remove(key);
        let existed = self.dbs[db].data.remove(key).is_some();
        if existed {
            self.touch(db, key);
        }
        existed
    }

    pub fn exists(&self, db: usize, key: &[u8]) -> bool {
        if self.dbs[db].purge_expired(key) {
            self.touch(db, key);
            return false;
        }
        self.dbs[db].data.contains_key(key)
    }

    /// Set an absolute expiration on an existing key. Returns false when
    /// the key does not exist.
    pub fn expire_at(&self, db: usize, key: &[u8], expire_at_ms: u64) -> bool {
        if self.dbs[db].purge_expired(key) {
            self.touch(db, key);
            return false;
        }
        if !self.dbs[db].data.contains_key(key) {
            return false;
        }
        self.dbs[db]
            .expires
            .insert(Bytes::copy_from_slice(key), expire_at_ms);
        self.touch(db, key);
        true
    }

    /// Get TTL in milliseconds (-2 if the key doesn't exist, -1 if no expiry)
    pub fn ttl_ms(&self, db: usize, key: &[u8]) -> i64 {
        if self.dbs[db].purge_expired(key) {
            self.touch(db, key);
            return -2;
        }
        if !self.dbs[db].data.contains_key(key) {
            return -2;
        }
        match self.dbs[db].expires.get(key) {
            Some(entry) => {
                let now = current_timestamp_ms();
                (*entry.value()).saturating_sub(now) as i64
            }
            None => -1,
        }
    }

    pub fn len(&self, db: usize) -> usize {
        self.dbs[db].data.len()
    }

    pub fn is_empty(&self, db: usize) -> bool {
        self.dbs[db].data.is_empty()
    }

    /// Remove every key of one database, returning how many keys were
    /// dropped. Watchers of keys that are present at flush time are
    /// tainted first.
    pub fn flush_db(&self, db: usize) -> usize {
        {
            let mut watch = self.watch.lock().unwrap();
            watch.touch_on_flush(Some(db), |key_db, key| self.dbs[key_db].logically_exists(key));
        }
        let removed = self.dbs[db].data.len();
        self.dbs[db].clear();
        removed
    }

    /// Remove every key of every database. Same watcher semantics as
    /// [`Keyspace::flush_db`].
    pub fn flush_all(&self) -> usize {
        {
            let mut watch = self.watch.lock().unwrap();
            watch.touch_on_flush(None, |key_db, key| self.dbs[key_db].logically_exists(key));
        }
        let mut removed = 0;
        for db in &self.dbs {
            removed += db.data.len();
            db.clear();
        }
        removed
    }

    // Watch index surface. The index is owned here so the store-side
    // mutation hook and the WATCH bookkeeping cannot drift apart.

    pub fn watch_key(&self, client: ClientId, db: usize, key: Bytes) {
        self.watch.lock().unwrap().watch(client, db, key);
    }

    pub fn unwatch_all(&self, client: ClientId) {
        self.watch.lock().unwrap().unwatch_all(client);
    }

    pub fn is_cas_dirty(&self, client: ClientId) -> bool {
        self.watch.lock().unwrap().is_dirty(client)
    }

    pub fn watched_count(&self, client: ClientId) -> usize {
        self.watch.lock().unwrap().watched_count(client)
    }

    pub fn watcher_count(&self, db: usize, key: &[u8]) -> usize {
        self.watch.lock().unwrap().watcher_count(db, key)
    }

    pub fn total_watched_keys(&self) -> usize {
        self.watch.lock().unwrap().total_watched_keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_set_get_delete() {
        let ks = Keyspace::new(16);

        ks.set(0, key("k"), key("v"), false);
        assert_eq!(ks.get(0, b"k"), Some(key("v")));
        assert!(ks.exists(0, b"k"));

        assert!(ks.delete(0, b"k"));
        assert!(!ks.exists(0, b"k"));
        assert!(!ks.delete(0, b"k"));
    }

    #[test]
    fn test_databases_are_isolated() {
        let ks = Keyspace::new(16);
        ks.set(0, key("k"), key("v"), false);

        assert!(ks.exists(0, b"k"));
        assert!(!ks.exists(1, b"k"));
        assert_eq!(ks.len(0), 1);
        assert_eq!(ks.len(1), 0);
    }

    #[test]
    fn test_expiry() {
        let ks = Keyspace::new(16);
        let now = current_timestamp_ms();

        ks.set_with_expiry(0, key("gone"), key("v"), now.saturating_sub(10));
        assert_eq!(ks.get(0, b"gone"), None);
        assert_eq!(ks.ttl_ms(0, b"gone"), -2);

        ks.set(0, key("stays"), key("v"), false);
        assert_eq!(ks.ttl_ms(0, b"stays"), -1);

        assert!(ks.expire_at(0, b"stays", now + 60_000));
        assert!(ks.ttl_ms(0, b"stays") > 0);

        // SET without KEEPTTL discards the expiration.
        ks.set(0, key("stays"), key("v2"), false);
        assert_eq!(ks.ttl_ms(0, b"stays"), -1);
    }

    #[test]
    fn test_writes_taint_watchers() {
        let ks = Keyspace::new(16);
        ks.watch_key(1, 0, key("k"));
        assert!(!ks.is_cas_dirty(1));

        ks.set(0, key("k"), key("v"), false);
        assert!(ks.is_cas_dirty(1));

        ks.unwatch_all(1);
        assert!(!ks.is_cas_dirty(1));
    }

    #[test]
    fn test_delete_of_missing_key_does_not_taint() {
        let ks = Keyspace::new(16);
        ks.watch_key(1, 0, key("k"));

        ks.delete(0, b"k");
        assert!(!ks.is_cas_dirty(1));
    }

    #[test]
    fn test_expire_taints_watchers() {
        let ks = Keyspace::new(16);
        ks.set(0, key("k"), key("v"), false);
        ks.watch_key(1, 0, key("k"));

        assert!(ks.expire_at(0, b"k", current_timestamp_ms() + 60_000));
        assert!(ks.is_cas_dirty(1));
    }

    #[test]
    fn test_flush_taints_only_watchers_of_present_keys() {
        let ks = Keyspace::new(16);
        ks.set(0, key("present"), key("v"), false);
        ks.watch_key(1, 0, key("present"));
        ks.watch_key(2, 0, key("missing"));

        ks.flush_db(0);

        assert!(ks.is_cas_dirty(1));
        assert!(!ks.is_cas_dirty(2));
        assert_eq!(ks.len(0), 0);
    }

    #[test]
    fn test_flush_all_crosses_databases() {
        let ks = Keyspace::new(16);
        ks.set(3, key("k"), key("v"), false);
        ks.watch_key(1, 3, key("k"));

        ks.flush_db(0);
        assert!(!ks.is_cas_dirty(1));

        ks.flush_all();
        assert!(ks.is_cas_dirty(1));
        assert_eq!(ks.len(3), 0);
    }

    #[test]
    fn test_lazy_expiry_taints_watchers() {
        let ks = Keyspace::new(16);
        ks.set_with_expiry(0, key("k"), key("v"), current_timestamp_ms().saturating_sub(5));
        ks.watch_key(1, 0, key("k"));

        assert_eq!(ks.get(0, b"k"), None);
        assert!(ks.is_cas_dirty(1));
    }
}
