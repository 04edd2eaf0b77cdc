// EXEC engine - drains the queued batch and mirrors it downstream

use crate::commands::table::CommandFlags;
use crate::commands::{ExecContext, READONLY_ERR};
use crate::protocol::RespValue;
use crate::replication::PropagationTargets;
use bytes::Bytes;
use tracing::debug;

pub const EXEC_ABORT_ERR: &str = "EXECABORT Transaction discarded because of previous errors.";

/// The raw frame appended to the replication backlog when the server
/// stops being a primary in the middle of a drain: it terminates the
/// `MULTI` block already sitting in the backlog, which the normal
/// propagation path (disabled for non-primaries) can no longer do.
const RAW_EXEC_FRAME: &[u8] = b"*1\r\n$4\r\nEXEC\r\n";

/// Execute an open transaction.
///
/// Outcome precedence: a queueing-time error aborts with `EXECABORT`; a
/// touched watched key cancels with a null array; a write batch on a
/// read-only replica is refused; otherwise the queue drains in order
/// under the command gate the caller already holds, so no other client
/// can interleave. Every outcome is terminal: watches are dropped, the
/// queue is freed and the session returns to idle.
pub fn execute(ctx: &mut ExecContext) -> RespValue {
    if !ctx.session.tx.in_multi {
        return RespValue::error("ERR EXEC without MULTI");
    }

    let shared = ctx.shared;
    let session_id = ctx.session.id;

    if ctx.session.tx.dirty_exec {
        terminate(ctx);
        monitor_tail(ctx);
        return RespValue::error(EXEC_ABORT_ERR);
    }

    if shared.keyspace.is_cas_dirty(session_id) {
        debug!("Session {}: transaction cancelled by touched watch", session_id);
        terminate(ctx);
        monitor_tail(ctx);
        return RespValue::null_array();
    }

    if ctx.session.tx.queue.flags().contains(CommandFlags::WRITE)
        && shared.repl.is_replica()
        && !shared.is_loading()
        && shared.config.replica_read_only
        && !ctx.session.is_replica_link
    {
        terminate(ctx);
        monitor_tail(ctx);
        return RespValue::error(READONLY_ERR);
    }

    // The batch is committed to run: modifications of previously
    // watched keys can no longer cancel it.
    shared.keyspace.unwatch_all(session_id);

    let exec_db = ctx.session.db_index;
    let was_master = shared.repl.is_master();
    let mut entries = ctx.session.tx.queue.take();
    let mut must_propagate = false;
    let mut replies = Vec::with_capacity(entries.len());

    debug!("Session {}: draining {} queued commands", session_id, entries.len());

    for entry in entries.iter_mut() {
        // Lazy MULTI frame: the first entry that could write opens the
        // propagated block. Pure-read batches leave no downstream trace.
        if !must_propagate
            && !entry
                .spec
                .flags
                .intersects(CommandFlags::READONLY.union(CommandFlags::ADMIN))
        {
            shared.propagator.propagate(
                exec_db,
                &[Bytes::from_static(b"MULTI")],
                PropagationTargets::AOF | PropagationTargets::REPL,
            );
            must_propagate = true;
        }

        let entry_db = ctx.session.db_index;
        let argv = std::mem::take(&mut entry.argv);
        let mut sub = ExecContext::new(shared, &mut *ctx.session, argv);
        let reply = (entry.spec.handler)(&mut sub);
        let ExecContext { argv, dirty, .. } = sub;

        // Write back the possibly rewritten argv so propagation mirrors
        // what actually executed.
        entry.argv = argv;

        if dirty > 0 {
            shared.add_dirty(dirty);
            shared.propagator.propagate(
                entry_db,
                &entry.argv,
                PropagationTargets::AOF | PropagationTargets::REPL,
            );
        }

        replies.push(reply);
    }

    ctx.session.tx.reset();

    if must_propagate {
        shared.add_dirty(1);
        let exec_argv = [Bytes::from_static(b"EXEC")];
        if was_master && !shared.repl.is_master() {
            // Role changed mid-drain. The WAL path still works, but the
            // replication stream must be repaired with a raw frame.
            shared
                .propagator
                .propagate(exec_db, &exec_argv, PropagationTargets::AOF);
            shared.propagator.feed_backlog_raw(RAW_EXEC_FRAME);
        } else {
            shared.propagator.propagate(
                exec_db,
                &exec_argv,
                PropagationTargets::AOF | PropagationTargets::REPL,
            );
        }
    }

    monitor_tail(ctx);
    RespValue::Array(Some(replies))
}

/// Terminal transition shared by all abort paths: drop watches (which
/// clears the CAS-dirty bit) and return the session to idle.
fn terminate(ctx: &mut ExecContext) {
    ctx.shared.keyspace.unwatch_all(ctx.session.id);
    ctx.session.tx.reset();
}

/// Deliver the original EXEC invocation to monitors. Runs on every
/// outcome, aborts included, unless the server is replaying its log.
fn monitor_tail(ctx: &ExecContext) {
    if !ctx.shared.is_loading() && ctx.shared.monitors.has_monitors() {
        ctx.shared.monitors.feed(
            ctx.session.id,
            ctx.session.db_index,
            &ctx.session.addr,
            &ctx.argv,
        );
    }
}
