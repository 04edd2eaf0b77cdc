// Transaction command handlers (MULTI/EXEC/DISCARD/WATCH/UNWATCH)

use super::ExecContext;
use crate::protocol::RespValue;
use crate::transaction::exec;
use tracing::debug;

/// MULTI
pub fn multi(ctx: &mut ExecContext) -> RespValue {
    if ctx.session.tx.in_multi {
        return RespValue::error("ERR MULTI calls can not be nested");
    }
    ctx.session.tx.begin();
    debug!("Session {}: started transaction", ctx.session.id);
    RespValue::ok()
}

/// EXEC
pub fn exec(ctx: &mut ExecContext) -> RespValue {
    exec::execute(ctx)
}

/// DISCARD
pub fn discard(ctx: &mut ExecContext) -> RespValue {
    if !ctx.session.tx.in_multi {
        return RespValue::error("ERR DISCARD without MULTI");
    }
    ctx.shared.keyspace.unwatch_all(ctx.session.id);
    ctx.session.tx.reset();
    debug!("Session {}: discarded transaction", ctx.session.id);
    RespValue::ok()
}

/// WATCH key [key ...]
///
/// Must precede MULTI: watching from inside an open transaction could
/// never observe a concurrent modification, so it is rejected outright.
pub fn watch(ctx: &mut ExecContext) -> RespValue {
    if ctx.session.tx.in_multi {
        return RespValue::error("ERR WATCH inside MULTI is not allowed");
    }

    let db = ctx.db_index();
    for key in &ctx.argv[1..] {
        ctx.shared.keyspace.watch_key(ctx.session.id, db, key.clone());
    }
    RespValue::ok()
}

/// UNWATCH
pub fn unwatch(ctx: &mut ExecContext) -> RespValue {
    ctx.shared.keyspace.unwatch_all(ctx.session.id);
    RespValue::ok()
}
