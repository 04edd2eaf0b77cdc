// Command dispatcher

use super::table::{self, CommandFlags};
use super::{wrong_arity, ExecContext, READONLY_ERR};
use crate::protocol::RespValue;
use crate::replication::PropagationTargets;
use crate::server::{Session, Shared};
use bytes::Bytes;
use tracing::debug;

/// Route one client command: resolve the descriptor, apply arity and
/// queueing rules, execute, and propagate the result of a write.
///
/// The caller must hold the server's command gate for the whole call;
/// that is what makes a dispatched command (and the EXEC drain started
/// from here) atomic with respect to every other client.
pub fn dispatch(shared: &Shared, session: &mut Session, argv: Vec<Bytes>) -> RespValue {
    if argv.is_empty() {
        return RespValue::error("ERR empty command");
    }

    let Some(spec) = table::lookup(&argv[0]) else {
        // A resolution failure while queueing taints the transaction.
        if session.tx.in_multi {
            session.tx.dirty_exec = true;
        }
        let name = String::from_utf8_lossy(&argv[0]).to_string();
        return RespValue::error(format!("ERR unknown command '{}'", name));
    };

    if !spec.arity_ok(argv.len()) {
        if session.tx.in_multi {
            session.tx.dirty_exec = true;
        }
        return wrong_arity(spec.name);
    }

    if session.tx.in_multi && !spec.is_control() {
        debug!("Session {}: queued {}", session.id, spec.name);
        session.tx.queue.push(spec, argv);
        return RespValue::SimpleString("QUEUED".to_string());
    }

    // Read-only replica gate for direct writes. EXEC applies the same
    // gate to the flags aggregated over its queue.
    if spec.flags.contains(CommandFlags::WRITE)
        && shared.repl.is_replica()
        && !shared.is_loading()
        && shared.config.replica_read_only
        && !session.is_replica_link
    {
        return RespValue::error(READONLY_ERR);
    }

    // Monitors observe commands as they are dispatched. EXEC is the
    // exception: the engine feeds its tail after the drain.
    if spec.name != "EXEC" && !shared.is_loading() && shared.monitors.has_monitors() {
        shared
            .monitors
            .feed(session.id, session.db_index, &session.addr, &argv);
    }

    let mut ctx = ExecContext::new(shared, session, argv);
    let reply = (spec.handler)(&mut ctx);

    if ctx.dirty > 0 {
        shared.add_dirty(ctx.dirty);
        if spec.flags.contains(CommandFlags::WRITE) {
            shared.propagator.propagate(
                ctx.session.db_index,
                &ctx.argv,
                PropagationTargets::AOF | PropagationTargets::REPL,
            );
        }
    }

    reply
}
