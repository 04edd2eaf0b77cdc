// Command table - static descriptors consumed by the dispatcher

use super::ExecContext;
use crate::protocol::RespValue;

bitflags::bitflags! {
    /// Descriptor flags attached to each command.
    ///
    /// EXEC aggregates these over the queued batch: the WRITE bit gates
    /// execution on a read-only replica, while READONLY/ADMIN decide
    /// whether an entry triggers the propagated `MULTI` frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u32 {
        /// Command may modify the keyspace
        const WRITE = 1 << 0;
        /// Command never modifies the keyspace
        const READONLY = 1 << 1;
        /// Server administration command, never part of the data stream
        const ADMIN = 1 << 2;
    }
}

pub type CommandHandler = fn(&mut ExecContext<'_>) -> RespValue;

/// Static command descriptor: everything the dispatcher needs to route
/// a request without knowing the command's semantics.
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Number of arguments including the command name; negative means
    /// "at least that many".
    pub arity: i8,
    pub flags: CommandFlags,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn arity_ok(&self, argc: usize) -> bool {
        if self.arity >= 0 {
            argc == self.arity as usize
        } else {
            argc >= (-(self.arity as i32)) as usize
        }
    }

    /// Transaction-control commands are routed immediately even while a
    /// MULTI is open; everything else gets queued.
    pub fn is_control(&self) -> bool {
        matches!(self.name, "MULTI" | "EXEC" | "DISCARD" | "WATCH" | "UNWATCH")
    }
}

static COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "APPEND", arity: 3, flags: CommandFlags::WRITE, handler: super::string::append },
    CommandSpec { name: "DBSIZE", arity: 1, flags: CommandFlags::READONLY, handler: super::server_cmds::dbsize },
    CommandSpec { name: "DECR", arity: 2, flags: CommandFlags::WRITE, handler: super::string::decr },
    CommandSpec { name: "DEL", arity: -2, flags: CommandFlags::WRITE, handler: super::key_mgmt::del },
    CommandSpec { name: "DISCARD", arity: 1, flags: CommandFlags::empty(), handler: super::transaction_cmds::discard },
    CommandSpec { name: "ECHO", arity: 2, flags: CommandFlags::empty(), handler: super::server_cmds::echo },
    CommandSpec { name: "EXEC", arity: 1, flags: CommandFlags::empty(), handler: super::transaction_cmds::exec },
    CommandSpec { name: "EXISTS", arity: -2, flags: CommandFlags::READONLY, handler: super::key_mgmt::exists },
    CommandSpec { name: "EXPIRE", arity: 3, flags: CommandFlags::WRITE, handler: super::key_mgmt::expire },
    CommandSpec { name: "FLUSHALL", arity: 1, flags: CommandFlags::WRITE, handler: super::server_cmds::flushall },
    CommandSpec { name: "FLUSHDB", arity: 1, flags: CommandFlags::WRITE, handler: super::server_cmds::flushdb },
    CommandSpec { name: "GET", arity: 2, flags: CommandFlags::READONLY, handler: super::string::get },
    CommandSpec { name: "INCR", arity: 2, flags: CommandFlags::WRITE, handler: super::string::incr },
    CommandSpec { name: "INCRBY", arity: 3, flags: CommandFlags::WRITE, handler: super::string::incrby },
    CommandSpec { name: "MONITOR", arity: 1, flags: CommandFlags::ADMIN, handler: super::server_cmds::monitor },
    CommandSpec { name: "MULTI", arity: 1, flags: CommandFlags::empty(), handler: super::transaction_cmds::multi },
    CommandSpec { name: "PEXPIREAT", arity: 3, flags: CommandFlags::WRITE, handler: super::key_mgmt::pexpireat },
    CommandSpec { name: "PING", arity: -1, flags: CommandFlags::empty(), handler: super::server_cmds::ping },
    CommandSpec { name: "REPLICAOF", arity: 3, flags: CommandFlags::ADMIN, handler: super::replication_cmds::replicaof },
    CommandSpec { name: "ROLE", arity: 1, flags: CommandFlags::empty(), handler: super::replication_cmds::role },
    CommandSpec { name: "SELECT", arity: 2, flags: CommandFlags::empty(), handler: super::server_cmds::select },
    CommandSpec { name: "SET", arity: -3, flags: CommandFlags::WRITE, handler: super::string::set },
    CommandSpec { name: "SHUTDOWN", arity: -1, flags: CommandFlags::ADMIN, handler: super::server_cmds::shutdown },
    CommandSpec { name: "STRLEN", arity: 2, flags: CommandFlags::READONLY, handler: super::string::strlen },
    CommandSpec { name: "TTL", arity: 2, flags: CommandFlags::READONLY, handler: super::key_mgmt::ttl },
    CommandSpec { name: "UNWATCH", arity: 1, flags: CommandFlags::empty(), handler: super::transaction_cmds::unwatch },
    CommandSpec { name: "WATCH", arity: -2, flags: CommandFlags::empty(), handler: super::transaction_cmds::watch },
];

/// Resolve a command name (case-insensitive) to its descriptor.
pub fn lookup(name: &[u8]) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name.as_bytes().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup(b"set").unwrap().name, "SET");
        assert_eq!(lookup(b"SeT").unwrap().name, "SET");
        assert!(lookup(b"NOSUCHCMD").is_none());
    }

    #[test]
    fn test_arity_exact() {
        let get = lookup(b"GET").unwrap();
        assert!(get.arity_ok(2));
        assert!(!get.arity_ok(1));
        assert!(!get.arity_ok(3));
    }

    #[test]
    fn test_arity_minimum() {
        let set = lookup(b"SET").unwrap();
        assert!(!set.arity_ok(2));
        assert!(set.arity_ok(3));
        assert!(set.arity_ok(6));

        let watch = lookup(b"WATCH").unwrap();
        assert!(!watch.arity_ok(1));
        assert!(watch.arity_ok(2));
    }

    #[test]
    fn test_control_set() {
        for name in ["MULTI", "EXEC", "DISCARD", "WATCH", "UNWATCH"] {
            assert!(lookup(name.as_bytes()).unwrap().is_control(), "{}", name);
        }
        for name in ["SET", "GET", "PING", "FLUSHDB", "REPLICAOF"] {
            assert!(!lookup(name.as_bytes()).unwrap().is_control(), "{}", name);
        }
    }

    #[test]
    fn test_flag_classification() {
        assert!(lookup(b"SET").unwrap().flags.contains(CommandFlags::WRITE));
        assert!(lookup(b"GET").unwrap().flags.contains(CommandFlags::READONLY));
        assert!(lookup(b"MONITOR").unwrap().flags.contains(CommandFlags::ADMIN));
        assert_eq!(lookup(b"PING").unwrap().flags, CommandFlags::empty());
    }
}
