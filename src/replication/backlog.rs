// Replication backlog: a bounded byte stream of recent propagation frames

use std::collections::VecDeque;
use std::sync::RwLock;

const DEFAULT_BACKLOG_SIZE: usize = 1024 * 1024;

#[derive(Debug)]
struct BacklogInner {
    /// The retained tail of the replication stream.
    buf: VecDeque<u8>,
    /// Stream offset of the first retained byte.
    first_offset: u64,
    /// Stream offset one past the last retained byte.
    next_offset: u64,
}

/// The replication backlog holds the most recent stretch of the
/// replication byte stream so reconnecting replicas can catch up from
/// an offset instead of resyncing from scratch.
///
/// Frames are appended as raw bytes; the backlog has no notion of frame
/// boundaries. That is what makes it usable both for ordinary command
/// propagation and for the raw `EXEC` terminator appended when the
/// server's role changes in the middle of a transaction drain.
#[derive(Debug)]
pub struct ReplicationBacklog {
    inner: RwLock<BacklogInner>,
    /// Maximum number of retained bytes
    max_size: usize,
}

impl ReplicationBacklog {
    /// Create a backlog with the default capacity (1MB)
    pub fn new() -> Self {
        Self::with_size(DEFAULT_BACKLOG_SIZE)
    }

    /// Create a backlog with a specific capacity in bytes
    pub fn with_size(max_size: usize) -> Self {
        Self {
            inner: RwLock::new(BacklogInner {
                buf: VecDeque::new(),
                first_offset: 0,
                next_offset: 0,
            }),
            max_size,
        }
    }

    /// Append raw bytes to the stream, evicting the oldest bytes when
    /// over capacity. Returns the stream offset after the append.
    pub fn append(&self, data: &[u8]) -> u64 {
        let mut inner = self.inner.write().unwrap();
        inner.buf.extend(data.iter().copied());
        inner.next_offset += data.len() as u64;

        while inner.buf.len() > self.max_size {
            inner.buf.pop_front();
            inner.first_offset += 1;
        }

        inner.next_offset
    }

    /// Read the stream from `offset` to the end. Returns `None` when
    /// the offset has already been evicted (a full resync is needed).
    pub fn read_from(&self, offset: u64) -> Option<Vec<u8>> {
        let inner = self.inner.read().unwrap();

        if offset < inner.first_offset || offset > inner.next_offset {
            return None;
        }

        let skip = (offset - inner.first_offset) as usize;
        Some(inner.buf.iter().skip(skip).copied().collect())
    }

    /// Stream offset of the oldest retained byte
    pub fn first_offset(&self) -> u64 {
        self.inner.read().unwrap().first_offset
    }

    /// Stream offset one past the newest retained byte
    pub fn next_offset(&self) -> u64 {
        self.inner.read().unwrap().next_offset
    }

    /// Number of bytes currently retained
    pub fn byte_len(&self) -> usize {
        self.inner.read().unwrap().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().buf.is_empty()
    }

    /// Drop the retained stream without rewinding offsets
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        let next = inner.next_offset;
        inner.buf.clear();
        inner.first_offset = next;
    }
}

impl Default for ReplicationBacklog {
    fn default() -> Self {
        Self::new()
    }
}
