// String command handlers

use super::{not_an_integer, parse_i64, syntax_error, ExecContext};
use crate::protocol::RespValue;
use crate::storage::current_timestamp_ms;
use bytes::Bytes;

/// SET key value [EX seconds | PX milliseconds | EXAT unix-seconds | PXAT unix-milliseconds] [NX|XX] [KEEPTTL] [GET]
///
/// A relative expiration is rewritten in place to its absolute `PXAT`
/// form before the handler returns, so the propagated command pins the
/// same deadline on every replay.
pub fn set(ctx: &mut ExecContext) -> RespValue {
    let key = ctx.argv[1].clone();
    let value = ctx.argv[2].clone();

    let mut expire_at_ms: Option<u64> = None;
    // argv slot holding the expiration option, for the PXAT rewrite
    let mut expire_opt_index: Option<usize> = None;
    let mut nx = false;
    let mut xx = false;
    let mut keep_ttl = false;
    let mut get = false;

    let mut i = 3;
    while i < ctx.argv.len() {
        let option = match std::str::from_utf8(&ctx.argv[i]) {
            Ok(s) => s.to_uppercase(),
            Err(_) => return syntax_error(),
        };

        match option.as_str() {
            "EX" | "PX" | "EXAT" | "PXAT" => {
                if expire_at_ms.is_some() || i + 1 >= ctx.argv.len() {
                    return syntax_error();
                }
                let n = match parse_i64(&ctx.argv[i + 1]) {
                    Some(n) => n,
                    None => return not_an_integer(),
                };
                let at = match option.as_str() {
                    "EX" | "PX" if n <= 0 => {
                        return RespValue::error("ERR invalid expire time in 'set' command");
                    }
                    "EX" => current_timestamp_ms() as i64 + n.saturating_mul(1000),
                    "PX" => current_timestamp_ms() as i64 + n,
                    "EXAT" => n.saturating_mul(1000),
                    _ => n,
                };
                if at < 0 {
                    return RespValue::error("ERR invalid expire time in 'set' command");
                }
                expire_at_ms = Some(at as u64);
                expire_opt_index = Some(i);
                i += 2;
            }
            "NX" => {
                if xx {
                    return syntax_error();
                }
                nx = true;
                i += 1;
            }
            "XX" => {
                if nx {
                    return syntax_error();
                }
                xx = true;
                i += 1;
            }
            "KEEPTTL" => {
                keep_ttl = true;
                i += 1;
            }
            "GET" => {
                get = true;
                i += 1;
            }
            _ => return syntax_error(),
        }
    }

    let db = ctx.db_index();
    let old = ctx.shared.keyspace.get(db, &key);

    if (nx && old.is_some()) || (xx && old.is_none()) {
        return if get {
            RespValue::BulkString(old)
        } else {
            RespValue::BulkString(None)
        };
    }

    if let (Some(at), Some(idx)) = (expire_at_ms, expire_opt_index) {
        ctx.argv[idx] = Bytes::from_static(b"PXAT");
        ctx.argv[idx + 1] = Bytes::from(at.to_string());
    }

    match expire_at_ms {
        Some(at) => ctx.shared.keyspace.set_with_expiry(db, key, value, at),
        None => ctx.shared.keyspace.set(db, key, value, keep_ttl),
    }
    ctx.dirty += 1;

    if get {
        RespValue::BulkString(old)
    } else {
        RespValue::ok()
    }
}

/// GET key
pub fn get(ctx: &mut ExecContext) -> RespValue {
    let db = ctx.db_index();
    RespValue::BulkString(ctx.shared.keyspace.get(db, &ctx.argv[1]))
}

/// INCR key
pub fn incr(ctx: &mut ExecContext) -> RespValue {
    incr_decr(ctx, 1)
}

/// DECR key
pub fn decr(ctx: &mut ExecContext) -> RespValue {
    incr_decr(ctx, -1)
}

/// INCRBY key increment
pub fn incrby(ctx: &mut ExecContext) -> RespValue {
    let delta = match parse_i64(&ctx.argv[2]) {
        Some(n) => n,
        None => return not_an_integer(),
    };
    incr_decr(ctx, delta)
}

fn incr_decr(ctx: &mut ExecContext, delta: i64) -> RespValue {
    let key = ctx.argv[1].clone();
    let db = ctx.db_index();

    let current = match ctx.shared.keyspace.get(db, &key) {
        Some(v) => match std::str::from_utf8(&v).ok().and_then(|s| s.parse::<i64>().ok()) {
            Some(n) => n,
            None => return not_an_integer(),
        },
        None => 0,
    };

    let new = match current.checked_add(delta) {
        Some(n) => n,
        None => return not_an_integer(),
    };

    ctx.shared
        .keyspace
        .set(db, key, Bytes::from(new.to_string()), true);
    ctx.dirty += 1;
    RespValue::Integer(new)
}

/// APPEND key value
pub fn append(ctx: &mut ExecContext) -> RespValue {
    let key = ctx.argv[1].clone();
    let suffix = &ctx.argv[2];
    let db = ctx.db_index();

    let new = match ctx.shared.keyspace.get(db, &key) {
        Some(old) => {
            let mut combined = Vec::with_capacity(old.len() + suffix.len());
            combined.extend_from_slice(&old);
            combined.extend_from_slice(suffix);
            Bytes::from(combined)
        }
        None => suffix.clone(),
    };

    let len = new.len();
    ctx.shared.keyspace.set(db, key, new, true);
    ctx.dirty += 1;
    RespValue::Integer(len as i64)
}

/// STRLEN key
pub fn strlen(ctx: &mut ExecContext) -> RespValue {
    let db = ctx.db_index();
    let len = ctx
        .shared
        .keyspace
        .get(db, &ctx.argv[1])
        .map_or(0, |v| v.len());
    RespValue::Integer(len as i64)
}
