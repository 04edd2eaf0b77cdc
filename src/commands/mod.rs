// Commands module - descriptor table, dispatcher and handlers

pub mod dispatcher;
pub mod key_mgmt;
pub mod replication_cmds;
pub mod server_cmds;
pub mod string;
pub mod table;
pub mod transaction_cmds;

pub use dispatcher::dispatch;
pub use table::{lookup, CommandFlags, CommandSpec};

use crate::protocol::RespValue;
use crate::server::{Session, Shared};
use bytes::Bytes;

pub(crate) const READONLY_ERR: &str = "READONLY You can't write against a read only replica.";

/// Execution context handed to a command handler.
///
/// `argv` is the command's argument vector with `argv[0]` being the
/// command name. Handlers may rewrite it in place (for example turning
/// a relative expiration into its absolute form); whatever the vector
/// holds after the handler returns is what propagation delivers
/// downstream.
pub struct ExecContext<'a> {
    pub shared: &'a Shared,
    pub session: &'a mut Session,
    pub argv: Vec<Bytes>,
    /// Number of keyspace modifications performed by this command.
    /// Zero means nothing changed and nothing is propagated.
    pub dirty: u64,
}

impl<'a> ExecContext<'a> {
    pub fn new(shared: &'a Shared, session: &'a mut Session, argv: Vec<Bytes>) -> Self {
        Self {
            shared,
            session,
            argv,
            dirty: 0,
        }
    }

    pub fn db_index(&self) -> usize {
        self.session.db_index
    }
}

/// Parse a command argument as a signed 64-bit integer.
pub(crate) fn parse_i64(arg: &[u8]) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse::<i64>().ok()
}

pub(crate) fn wrong_arity(name: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_lowercase()
    ))
}

pub(crate) fn not_an_integer() -> RespValue {
    RespValue::error("ERR value is not an integer or out of range")
}

pub(crate) fn syntax_error() -> RespValue {
    RespValue::error("ERR syntax error")
}
