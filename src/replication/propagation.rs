// Command propagation - delivers executed write commands downstream

use crate::persistence::aof::AofWriter;
use crate::protocol::encode_command_into;
use crate::replication::{ReplicationBacklog, ReplicationInfo};
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error};

bitflags::bitflags! {
    /// Downstream sinks a command frame can be delivered to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropagationTargets: u8 {
        /// The append-only file (the server's write-ahead log)
        const AOF = 1 << 0;
        /// The replication backlog and attached replica feeds
        const REPL = 1 << 1;
    }
}

/// An attached replica's outgoing frame channel. The task owning the
/// other end writes frames to the replica's socket.
#[derive(Debug)]
struct ReplicaFeed {
    id: u64,
    sender: mpsc::UnboundedSender<Bytes>,
}

/// Fans executed commands out to the append-only file and the
/// replication stream.
///
/// Frames are RESP arrays of bulk strings, prefixed with a `SELECT`
/// frame when the command ran against a non-default database, so both
/// sinks can be replayed without extra context. Replication delivery is
/// a no-op while the server is a replica; every delivery is a no-op
/// while the server is loading its persisted state (replaying the AOF
/// must not feed the AOF).
#[derive(Debug)]
pub struct Propagator {
    aof: Option<Arc<AofWriter>>,
    backlog: Arc<ReplicationBacklog>,
    repl: Arc<ReplicationInfo>,
    loading: Arc<AtomicBool>,
    feeds: Mutex<Vec<ReplicaFeed>>,
    next_feed_id: AtomicU64,
}

impl Propagator {
    pub fn new(
        aof: Option<Arc<AofWriter>>,
        backlog: Arc<ReplicationBacklog>,
        repl: Arc<ReplicationInfo>,
        loading: Arc<AtomicBool>,
    ) -> Self {
        Self {
            aof,
            backlog,
            repl,
            loading,
            feeds: Mutex::new(Vec::new()),
            next_feed_id: AtomicU64::new(1),
        }
    }

    /// Deliver a command frame to the selected targets.
    pub fn propagate(&self, db_index: usize, argv: &[Bytes], targets: PropagationTargets) {
        if self.loading.load(Ordering::SeqCst) {
            return;
        }

        let frame = Self::encode_frame(db_index, argv);

        if targets.contains(PropagationTargets::AOF) {
            if let Some(aof) = &self.aof {
                if let Err(e) = aof.append_frame(&frame) {
                    error!("Failed to append to AOF: {}", e);
                }
            }
        }

        if targets.contains(PropagationTargets::REPL) && self.repl.is_master() {
            self.feed_replication_stream(&frame);
        }
    }

    /// Append raw bytes directly to the replication backlog, bypassing
    /// frame encoding and the role check. Used to terminate a `MULTI`
    /// block already in the backlog when the server stopped being a
    /// primary mid-transaction.
    pub fn feed_backlog_raw(&self, frame: &[u8]) {
        if self.loading.load(Ordering::SeqCst) {
            return;
        }
        debug!("Appending {} raw bytes to replication backlog", frame.len());
        let offset = self.backlog.append(frame);
        self.repl.set_offset(offset);
    }

    fn feed_replication_stream(&self, frame: &Bytes) {
        let offset = self.backlog.append(frame);
        self.repl.set_offset(offset);

        let mut feeds = self.feeds.lock().unwrap();
        feeds.retain(|feed| {
            // Feeds share the frame's storage; a send is a refcount bump.
            let alive = feed.sender.send(frame.clone()).is_ok();
            if !alive {
                debug!("Replica feed {} disconnected, dropping", feed.id);
            }
            alive
        });
    }

    /// Encode a command as its propagation frame, prefixing a `SELECT`
    /// frame for non-default databases.
    fn encode_frame(db_index: usize, argv: &[Bytes]) -> Bytes {
        let mut out = BytesMut::new();
        if db_index != 0 {
            let select = [
                Bytes::from_static(b"SELECT"),
                Bytes::from(db_index.to_string()),
            ];
            encode_command_into(&mut out, &select);
        }
        encode_command_into(&mut out, argv);
        out.freeze()
    }

    /// Attach a replica feed; the returned receiver yields every frame
    /// propagated to replication from now on.
    pub fn attach_replica_feed(&self) -> (u64, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_feed_id.fetch_add(1, Ordering::SeqCst);
        self.feeds.lock().unwrap().push(ReplicaFeed { id, sender: tx });
        (id, rx)
    }

    pub fn detach_replica_feed(&self, id: u64) {
        self.feeds.lock().unwrap().retain(|feed| feed.id != id);
    }

    pub fn replica_feed_count(&self) -> usize {
        self.feeds.lock().unwrap().len()
    }

    pub fn aof(&self) -> Option<Arc<AofWriter>> {
        self.aof.clone()
    }

    /// Flush the AOF buffer to disk, if the AOF is enabled.
    pub fn flush_aof(&self) -> anyhow::Result<()> {
        if let Some(aof) = &self.aof {
            aof.flush()?;
        }
        Ok(())
    }
}
