// Persistence module - append-only file (write-ahead log)

pub mod aof;

pub use aof::{AofReader, AofSyncPolicy, AofWriter};
