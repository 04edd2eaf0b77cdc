// Server command handlers (PING, ECHO, SELECT, FLUSHDB, ...)

use super::{parse_i64, wrong_arity, ExecContext};
use crate::protocol::RespValue;
use tracing::info;

/// PING [message]
pub fn ping(ctx: &mut ExecContext) -> RespValue {
    match ctx.argv.len() {
        1 => RespValue::SimpleString("PONG".to_string()),
        2 => RespValue::BulkString(Some(ctx.argv[1].clone())),
        _ => wrong_arity("ping"),
    }
}

/// ECHO message
pub fn echo(ctx: &mut ExecContext) -> RespValue {
    RespValue::BulkString(Some(ctx.argv[1].clone()))
}

/// SELECT index
pub fn select(ctx: &mut ExecContext) -> RespValue {
    let index = match parse_i64(&ctx.argv[1]) {
        Some(n) if n >= 0 => n as usize,
        _ => return RespValue::error("ERR DB index is out of range"),
    };

    if index >= ctx.shared.keyspace.num_databases() {
        return RespValue::error("ERR DB index is out of range");
    }

    ctx.session.db_index = index;
    RespValue::ok()
}

/// DBSIZE
pub fn dbsize(ctx: &mut ExecContext) -> RespValue {
    let db = ctx.db_index();
    RespValue::Integer(ctx.shared.keyspace.len(db) as i64)
}

/// FLUSHDB
pub fn flushdb(ctx: &mut ExecContext) -> RespValue {
    let db = ctx.db_index();
    ctx.dirty += ctx.shared.keyspace.flush_db(db) as u64;
    RespValue::ok()
}

/// FLUSHALL
pub fn flushall(ctx: &mut ExecContext) -> RespValue {
    ctx.dirty += ctx.shared.keyspace.flush_all() as u64;
    RespValue::ok()
}

/// MONITOR
///
/// Flips the session into monitor mode; the connection layer attaches
/// the feed channel once the OK reply has been written.
pub fn monitor(ctx: &mut ExecContext) -> RespValue {
    ctx.session.monitor = true;
    RespValue::ok()
}

/// SHUTDOWN [NOSAVE|SAVE]
pub fn shutdown(ctx: &mut ExecContext) -> RespValue {
    info!("Shutdown requested by session {}", ctx.session.id);
    if let Err(e) = ctx.shared.propagator.flush_aof() {
        tracing::warn!("Final AOF flush failed: {}", e);
    }
    std::process::exit(0);
}
