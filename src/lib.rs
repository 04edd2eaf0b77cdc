// Cinnabar - a Redis-compatible in-memory key-value server with
// transactional execution (MULTI/EXEC/DISCARD, WATCH/UNWATCH)

pub mod commands;
pub mod monitor;
pub mod persistence;
pub mod protocol;
pub mod replication;
pub mod server;
pub mod storage;
pub mod transaction;

// Re-export commonly used types
pub use commands::{dispatch, CommandFlags};
pub use protocol::{RespError, RespValue};
pub use replication::{PropagationTargets, ReplicationRole};
pub use server::{CinnabarServer, ServerConfig, Session, Shared};
pub use storage::Keyspace;
pub use transaction::TxState;
