// Keyspace management commands

use super::{not_an_integer, parse_i64, ExecContext};
use crate::protocol::RespValue;
use crate::storage::current_timestamp_ms;
use bytes::Bytes;

/// DEL key [key ...]
pub fn del(ctx: &mut ExecContext) -> RespValue {
    let db = ctx.db_index();
    let mut removed = 0;
    for key in &ctx.argv[1..] {
        if ctx.shared.keyspace.delete(db, key) {
            removed += 1;
        }
    }
    ctx.dirty += removed;
    RespValue::Integer(removed as i64)
}

/// EXISTS key [key ...]
pub fn exists(ctx: &mut ExecContext) -> RespValue {
    let db = ctx.db_index();
    let mut count = 0;
    for key in &ctx.argv[1..] {
        if ctx.shared.keyspace.exists(db, key) {
            count += 1;
        }
    }
    RespValue::Integer(count)
}

/// EXPIRE key seconds
///
/// Applied as an absolute deadline and rewritten to `PEXPIREAT` so the
/// propagated form replays identically however late a replica sees it.
pub fn expire(ctx: &mut ExecContext) -> RespValue {
    let seconds = match parse_i64(&ctx.argv[2]) {
        Some(n) => n,
        None => return not_an_integer(),
    };

    let at = current_timestamp_ms() as i64 + seconds.saturating_mul(1000);
    let at = at.max(0) as u64;

    let db = ctx.db_index();
    let key = ctx.argv[1].clone();
    let applied = ctx.shared.keyspace.expire_at(db, &key, at);
    if applied {
        ctx.dirty += 1;
        ctx.argv = vec![
            Bytes::from_static(b"PEXPIREAT"),
            key,
            Bytes::from(at.to_string()),
        ];
    }
    RespValue::Integer(applied as i64)
}

/// PEXPIREAT key unix-time-milliseconds
pub fn pexpireat(ctx: &mut ExecContext) -> RespValue {
    let at = match parse_i64(&ctx.argv[2]) {
        Some(n) => n.max(0) as u64,
        None => return not_an_integer(),
    };

    let db = ctx.db_index();
    let applied = ctx.shared.keyspace.expire_at(db, &ctx.argv[1], at);
    if applied {
        ctx.dirty += 1;
    }
    RespValue::Integer(applied as i64)
}

/// TTL key
pub fn ttl(ctx: &mut ExecContext) -> RespValue {
    let db = ctx.db_index();
    let ms = ctx.shared.keyspace.ttl_ms(db, &ctx.argv[1]);
    if ms < 0 {
        return RespValue::Integer(ms);
    }
    RespValue::Integer((ms + 999) / 1000)
}
