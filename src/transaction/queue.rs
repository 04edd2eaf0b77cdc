// Command queue - per-client buffer of commands accumulated between MULTI and EXEC

use crate::commands::table::{CommandFlags, CommandSpec};
use bytes::Bytes;

/// A single command buffered by MULTI, holding its resolved descriptor
/// and an owned copy of the argument vector. `Bytes` arguments are
/// reference-counted, so queuing bumps refcounts instead of copying
/// payloads.
#[derive(Debug)]
pub struct QueuedCommand {
    pub spec: &'static CommandSpec,
    pub argv: Vec<Bytes>,
}

/// Ordered buffer of queued commands plus the OR of their descriptor
/// flags. The aggregate is what lets EXEC decide in O(1) whether the
/// batch contains a write without rescanning the queue.
#[derive(Debug)]
pub struct CommandQueue {
    entries: Vec<QueuedCommand>,
    flags: CommandFlags,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            flags: CommandFlags::empty(),
        }
    }

    /// Append a command, folding its descriptor flags into the aggregate.
    pub fn push(&mut self, spec: &'static CommandSpec, argv: Vec<Bytes>) {
        self.flags |= spec.flags;
        self.entries.push(QueuedCommand { spec, argv });
    }

    /// Hand the buffered entries out for the EXEC drain, leaving the
    /// queue empty with cleared flags.
    pub fn take(&mut self) -> Vec<QueuedCommand> {
        self.flags = CommandFlags::empty();
        std::mem::take(&mut self.entries)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.flags = CommandFlags::empty();
    }

    /// Bitwise OR of descriptor flags over all queued entries.
    pub fn flags(&self) -> CommandFlags {
        self.flags
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
