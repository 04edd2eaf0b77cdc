// Replication command handlers (REPLICAOF, ROLE)

use super::ExecContext;
use crate::protocol::RespValue;
use crate::replication::ReplicationRole;
use tracing::info;

/// REPLICAOF host port | REPLICAOF NO ONE
pub fn replicaof(ctx: &mut ExecContext) -> RespValue {
    let host = String::from_utf8_lossy(&ctx.argv[1]).to_string();
    let port_arg = String::from_utf8_lossy(&ctx.argv[2]).to_string();

    if host.eq_ignore_ascii_case("no") && port_arg.eq_ignore_ascii_case("one") {
        if ctx.shared.repl.is_replica() {
            ctx.shared.repl.set_master();
            info!("MASTER MODE enabled");
        }
        return RespValue::ok();
    }

    let port = match port_arg.parse::<u16>() {
        Ok(p) => p,
        Err(_) => return RespValue::error("ERR Invalid master port"),
    };

    ctx.shared.repl.set_replica(host.clone(), port);
    info!("REPLICAOF {}:{} enabled", host, port);
    RespValue::ok()
}

/// ROLE
pub fn role(ctx: &mut ExecContext) -> RespValue {
    match ctx.shared.repl.role() {
        ReplicationRole::Master => RespValue::Array(Some(vec![
            RespValue::bulk(&b"master"[..]),
            RespValue::Integer(ctx.shared.repl.master_offset() as i64),
            RespValue::Array(Some(vec![])),
        ])),
        ReplicationRole::Replica {
            master_host,
            master_port,
        } => RespValue::Array(Some(vec![
            RespValue::bulk(&b"slave"[..]),
            RespValue::bulk(master_host),
            RespValue::Integer(master_port as i64),
            RespValue::bulk(&b"connected"[..]),
            RespValue::Integer(ctx.shared.repl.master_offset() as i64),
        ])),
    }
}
