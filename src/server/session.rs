// Per-connection session state

use crate::transaction::TxState;

/// State the server keeps for one client connection.
///
/// The id is the session's stable handle: the watch index and the
/// monitor hub refer to clients only through it, never through the
/// connection. Ids are allocated from a shared counter and never
/// reused, and disconnect cleanup runs before the id is retired.
#[derive(Debug)]
pub struct Session {
    pub id: u64,
    /// Peer address, used in monitor lines
    pub addr: String,
    /// Currently selected database
    pub db_index: usize,
    /// Transaction lifecycle state
    pub tx: TxState,
    /// Set for the replication link applying a primary's stream; such a
    /// session bypasses the read-only replica gate.
    pub is_replica_link: bool,
    /// Set by MONITOR; the connection switches into feed mode after
    /// replying OK.
    pub monitor: bool,
}

impl Session {
    pub fn new(id: u64, addr: String) -> Self {
        Self {
            id,
            addr,
            db_index: 0,
            tx: TxState::new(),
            is_replica_link: false,
            monitor: false,
        }
    }
}
