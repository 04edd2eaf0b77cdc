// Replication information and state management

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Server role in replication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationRole {
    /// This server is a primary
    Master,
    /// This server replicates another server
    Replica {
        master_host: String,
        master_port: u16,
    },
}

/// Replication information manager
#[derive(Debug)]
pub struct ReplicationInfo {
    /// Server role
    role: RwLock<ReplicationRole>,
    /// Replication ID (regenerated when becoming a primary)
    replication_id: RwLock<String>,
    /// Primary replication offset: bytes ever written to the backlog stream
    master_offset: AtomicU64,
}

impl ReplicationInfo {
    /// Create new replication info (default: master)
    pub fn new() -> Self {
        Self {
            role: RwLock::new(ReplicationRole::Master),
            replication_id: RwLock::new(Self::generate_replication_id()),
            master_offset: AtomicU64::new(0),
        }
    }

    /// Generate a new replication ID (40 character random hex string)
    fn generate_replication_id() -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        (0..40)
            .map(|_| format!("{:x}", rng.gen::<u8>() % 16))
            .collect()
    }

    /// Get current role
    pub fn role(&self) -> ReplicationRole {
        self.role.read().unwrap().clone()
    }

    /// Check if this server is a master
    pub fn is_master(&self) -> bool {
        matches!(*self.role.read().unwrap(), ReplicationRole::Master)
    }

    /// Check if this server is a replica
    pub fn is_replica(&self) -> bool {
        matches!(*self.role.read().unwrap(), ReplicationRole::Replica { .. })
    }

    /// Set as master. A fresh replication ID is generated so history
    /// from the previous primary cannot be confused with ours.
    pub fn set_master(&self) {
        let mut role = self.role.write().unwrap();
        *role = ReplicationRole::Master;

        let mut repl_id = self.replication_id.write().unwrap();
        *repl_id = Self::generate_replication_id();
    }

    /// Set as replica of the given primary
    pub fn set_replica(&self, master_host: String, master_port: u16) {
        let mut role = self.role.write().unwrap();
        *role = ReplicationRole::Replica {
            master_host,
            master_port,
        };
    }

    /// Get replication ID
    pub fn replication_id(&self) -> String {
        self.replication_id.read().unwrap().clone()
    }

    /// Get master replication offset
    pub fn master_offset(&self) -> u64 {
        self.master_offset.load(Ordering::SeqCst)
    }

    /// Set master offset (mirrors the backlog's end-of-stream offset)
    pub fn set_offset(&self, offset: u64) {
        self.master_offset.store(offset, Ordering::SeqCst);
    }
}

impl Default for ReplicationInfo {
    fn default() -> Self {
        Self::new()
    }
}
