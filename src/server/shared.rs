// Shared server state

use super::config::ServerConfig;
use crate::monitor::MonitorHub;
use crate::persistence::aof::AofWriter;
use crate::replication::{Propagator, ReplicationBacklog, ReplicationInfo};
use crate::storage::Keyspace;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything a command execution can reach, shared by all connections.
///
/// `gate` realizes the serial execution model: a connection acquires it
/// for each command and EXEC holds it across its whole drain, so at any
/// instant at most one command is executing and a drain never
/// interleaves with another client. All inner locks (watch index, AOF
/// file, feeds) are acquired only while the gate is held; they provide
/// interior mutability, not a concurrency protocol.
#[derive(Debug)]
pub struct Shared {
    pub config: ServerConfig,
    pub keyspace: Keyspace,
    pub repl: Arc<ReplicationInfo>,
    pub backlog: Arc<ReplicationBacklog>,
    pub propagator: Propagator,
    pub monitors: MonitorHub,
    /// Serial command execution gate
    pub gate: Mutex<()>,
    loading: Arc<AtomicBool>,
    /// Count of keyspace modifications since startup
    dirty: AtomicU64,
    next_session_id: AtomicU64,
}

impl Shared {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let keyspace = Keyspace::new(config.databases);
        let repl = Arc::new(ReplicationInfo::new());
        let backlog = Arc::new(ReplicationBacklog::new());
        let loading = Arc::new(AtomicBool::new(false));

        let aof = if config.aof_enabled {
            Some(Arc::new(AofWriter::new(
                &config.aof_filename,
                config.aof_sync_policy,
            )?))
        } else {
            None
        };

        let propagator = Propagator::new(aof, backlog.clone(), repl.clone(), loading.clone());

        Ok(Self {
            config,
            keyspace,
            repl,
            backlog,
            propagator,
            monitors: MonitorHub::new(),
            gate: Mutex::new(()),
            loading,
            dirty: AtomicU64::new(0),
            next_session_id: AtomicU64::new(1),
        })
    }

    /// Allocate a fresh session id. Ids are never reused.
    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Whether the server is replaying persisted state. Propagation and
    /// monitor feeds are suppressed while this is up.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::SeqCst);
    }

    pub fn add_dirty(&self, n: u64) {
        self.dirty.fetch_add(n, Ordering::SeqCst);
    }

    pub fn dirty(&self) -> u64 {
        self.dirty.load(Ordering::SeqCst)
    }
}
