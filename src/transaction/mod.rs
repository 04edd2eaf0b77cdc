// Transaction support - MULTI/EXEC/DISCARD with WATCH-based optimistic locking

pub mod exec;
pub mod queue;
pub mod watch;

pub use queue::{CommandQueue, QueuedCommand};
pub use watch::{ClientId, WatchIndex};

/// Per-session transaction lifecycle state.
///
/// The lifecycle has two states: idle and in-MULTI. Commands arriving
/// while in-MULTI are buffered in `queue` instead of executing;
/// `dirty_exec` records a queuing-time failure (unknown command, bad
/// arity) that dooms the eventual EXEC. The CAS-dirty flag lives in the
/// watch index, keyed by session id, because it is set from *other*
/// clients' write paths.
#[derive(Debug, Default)]
pub struct TxState {
    /// MULTI has been issued and not yet terminated by EXEC or DISCARD.
    pub in_multi: bool,
    /// A command failed validation while being queued.
    pub dirty_exec: bool,
    /// Commands buffered since MULTI.
    pub queue: CommandQueue,
}

impl TxState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter MULTI. The caller must have rejected nested MULTI already.
    pub fn begin(&mut self) {
        self.in_multi = true;
        self.dirty_exec = false;
        self.queue.clear();
    }

    /// Terminal transition: leave MULTI and drop all buffered state.
    /// Runs on EXEC (all outcomes), DISCARD and disconnect.
    pub fn reset(&mut self) {
        self.in_multi = false;
        self.dirty_exec = false;
        self.queue.clear();
    }
}
