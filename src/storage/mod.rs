// Storage module - keyspace and per-database instances

pub mod db;

pub use db::{current_timestamp_ms, Keyspace};
