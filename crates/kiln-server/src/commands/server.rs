//! Server administration command handlers.

use std::fmt::Write as _;
use std::sync::atomic::Ordering;

use bytes::Bytes;

use kiln_protocol::Frame;

use super::ErrorReply;
use super::{
    arg_str, arg_usize, array, bulk, int, ok, simple, wrong_args, Ctx, CommandSpec, Reply,
    ADMIN, NO_DB_SELECT, PUBSUB, READONLY, WRITE,
};
use crate::server::unix_now_secs;
use crate::snapshotter;

pub fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec { name: "PING", arity: -1, flags: READONLY | PUBSUB | NO_DB_SELECT, handler: ping },
        CommandSpec { name: "ECHO", arity: 2, flags: READONLY | NO_DB_SELECT, handler: echo },
        CommandSpec { name: "DBSIZE", arity: 1, flags: READONLY, handler: dbsize },
        CommandSpec { name: "FLUSHDB", arity: -1, flags: WRITE, handler: flushdb },
        CommandSpec { name: "FLUSHALL", arity: -1, flags: WRITE | NO_DB_SELECT, handler: flushall },
        CommandSpec { name: "INFO", arity: -1, flags: READONLY | NO_DB_SELECT, handler: info },
        CommandSpec { name: "TIME", arity: 1, flags: READONLY | NO_DB_SELECT, handler: time },
        CommandSpec { name: "CONFIG", arity: -2, flags: ADMIN | NO_DB_SELECT, handler: config },
        CommandSpec { name: "COMMAND", arity: -1, flags: READONLY | NO_DB_SELECT, handler: command },
        CommandSpec { name: "CLIENT", arity: -2, flags: ADMIN | NO_DB_SELECT, handler: client },
        CommandSpec { name: "DEBUG", arity: -2, flags: ADMIN | NO_DB_SELECT, handler: debug },
        CommandSpec { name: "MEMORY", arity: -2, flags: READONLY | NO_DB_SELECT, handler: memory },
        CommandSpec { name: "SELECT", arity: 2, flags: READONLY | NO_DB_SELECT, handler: select },
        CommandSpec { name: "LASTSAVE", arity: 1, flags: READONLY | NO_DB_SELECT, handler: lastsave },
        CommandSpec { name: "QUIT", arity: 1, flags: READONLY | PUBSUB | NO_DB_SELECT, handler: quit },
        CommandSpec { name: "SHUTDOWN", arity: -1, flags: ADMIN | NO_DB_SELECT, handler: shutdown },
        CommandSpec { name: "SLOWLOG", arity: -2, flags: ADMIN | NO_DB_SELECT, handler: slowlog },
        CommandSpec { name: "ACL", arity: -1, flags: ADMIN | NO_DB_SELECT, handler: acl },
        CommandSpec { name: "SAVE", arity: 1, flags: ADMIN | NO_DB_SELECT, handler: save },
        CommandSpec { name: "BGSAVE", arity: -1, flags: ADMIN | NO_DB_SELECT, handler: bgsave },
    ]
}

fn ping(_ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    match args.len() {
        0 => simple("PONG"),
        1 => bulk(args[0].clone()),
        _ => Err(wrong_args("ping")),
    }
}

fn echo(_ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    bulk(args[0].clone())
}

fn dbsize(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    int(ctx.db().len() as i64)
}

fn flushdb(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    // the optional ASYNC/SYNC token is accepted and irrelevant here
    ctx.db().clear();
    ok()
}

fn flushall(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    ctx.store.flush_all();
    ok()
}

fn info(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let section = if args.is_empty() {
        None
    } else {
        Some(arg_str(args, 0)?.to_ascii_lowercase())
    };
    let want = |name: &str| section.as_deref().is_none_or(|s| s == name);

    let shared = ctx.shared;
    let mut out = String::new();

    if want("server") {
        let uptime = shared.started_at.elapsed().as_secs();
        let _ = write!(
            out,
            "# Server\r\nredis_version:7.0.0\r\nkiln_version:{}\r\nprocess_id:{}\r\nuptime_in_seconds:{}\r\nuptime_in_days:{}\r\ntcp_port:{}\r\n\r\n",
            env!("CARGO_PKG_VERSION"),
            std::process::id(),
            uptime,
            uptime / 86_400,
            shared.config.port,
        );
    }

    if want("clients") {
        let _ = write!(
            out,
            "# Clients\r\nconnected_clients:{}\r\nblocked_clients:0\r\n\r\n",
            shared.connected_clients.load(Ordering::Relaxed),
        );
    }

    if want("memory") {
        let used: usize = ctx
            .store
            .iter_dbs()
            .flat_map(|(_, db)| db.iter_entries())
            .map(|(key, value, _)| key.len() + value.estimated_size())
            .sum();
        let _ = write!(
            out,
            "# Memory\r\nused_memory:{used}\r\nused_memory_human:{:.2}K\r\n\r\n",
            used as f64 / 1024.0,
        );
    }

    if want("stats") {
        let expired: u64 = ctx.store.iter_dbs().map(|(_, db)| db.expired_total()).sum();
        let _ = write!(
            out,
            "# Stats\r\ntotal_commands_processed:{}\r\nexpired_keys:{}\r\n\r\n",
            shared.commands_processed.load(Ordering::Relaxed),
            expired,
        );
    }

    if want("replication") {
        out.push_str("# Replication\r\nrole:master\r\nconnected_slaves:0\r\n\r\n");
    }

    if want("keyspace") {
        out.push_str("# Keyspace\r\n");
        for (index, db) in ctx.store.iter_dbs() {
            if db.is_empty() {
                continue;
            }
            let _ = write!(
                out,
                "db{index}:keys={},expires={}\r\n",
                db.len(),
                db.expiry_count(),
            );
        }
    }

    bulk(out)
}

fn time(_ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    array(vec![
        Frame::bulk(now.as_secs().to_string()),
        Frame::bulk(now.subsec_micros().to_string()),
    ])
}

fn config(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let sub = arg_str(args, 0)?.to_ascii_uppercase();
    match sub.as_str() {
        "GET" => {
            if args.len() < 2 {
                return Err(wrong_args("config|get"));
            }
            let pattern = arg_str(args, 1)?;
            let save_line = ctx
                .shared
                .config
                .save_policy
                .iter()
                .map(|(s, c)| format!("{s} {c}"))
                .collect::<Vec<_>>()
                .join(" ");
            let params: [(&str, String); 5] = [
                ("maxmemory", "0".into()),
                ("save", save_line),
                ("appendonly", "no".into()),
                ("databases", ctx.shared.config.databases.to_string()),
                (
                    "dbfilename",
                    ctx.shared.config.dbfilename.display().to_string(),
                ),
            ];
            let mut out = Vec::new();
            for (name, value) in params {
                if kiln_core::glob::glob_match(pattern, name) {
                    out.push(Frame::bulk(name));
                    out.push(Frame::bulk(value));
                }
            }
            array(out)
        }
        "SET" | "RESETSTAT" | "REWRITE" => ok(),
        other => Err(ErrorReply::msg(format!(
            "ERR Unknown CONFIG subcommand or wrong number of arguments for '{other}'"
        ))),
    }
}

fn command(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let names = || {
        let mut names = ctx.shared.registry.names();
        names.sort_unstable();
        names
    };

    if args.is_empty() {
        return array(names().into_iter().map(Frame::bulk).collect());
    }

    match arg_str(args, 0)?.to_ascii_uppercase().as_str() {
        "COUNT" => int(ctx.shared.registry.len() as i64),
        "LIST" => array(names().into_iter().map(Frame::bulk).collect()),
        "DOCS" | "INFO" => array(Vec::new()),
        _ => array(Vec::new()),
    }
}

fn client(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let sub = arg_str(args, 0)?.to_ascii_uppercase();
    match sub.as_str() {
        "ID" => int(ctx.session.id as i64),
        "SETNAME" => {
            if args.len() != 2 {
                return Err(wrong_args("client|setname"));
            }
            ctx.session.name = Some(super::arg_string(args, 1)?);
            ok()
        }
        "GETNAME" => match &ctx.session.name {
            Some(name) => bulk(name.clone()),
            None => bulk(""),
        },
        "LIST" | "INFO" => {
            let line = format!(
                "id={} name={} db={} sub={} psub={}",
                ctx.session.id,
                ctx.session.name.as_deref().unwrap_or(""),
                ctx.session.db_index,
                ctx.session.channels.len(),
                ctx.session.patterns.len(),
            );
            bulk(line)
        }
        "KILL" | "PAUSE" | "UNPAUSE" | "NO-EVICT" | "NO-TOUCH" => ok(),
        other => Err(ErrorReply::msg(format!(
            "ERR Unknown CLIENT subcommand or wrong number of arguments for '{other}'"
        ))),
    }
}

fn debug(_ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let sub = arg_str(args, 0)?.to_ascii_uppercase();
    match sub.as_str() {
        // sleeps while holding the keyspace lock — stalls every other
        // client, which is exactly what latency tests want
        "SLEEP" => {
            if args.len() != 2 {
                return Err(wrong_args("debug|sleep"));
            }
            let secs: f64 = arg_str(args, 1)?
                .parse()
                .map_err(|_| super::not_a_float())?;
            if secs.is_sign_negative() || secs.is_nan() {
                return Err(super::not_a_float());
            }
            std::thread::sleep(std::time::Duration::from_secs_f64(secs.min(60.0)));
            ok()
        }
        _ => ok(),
    }
}

fn memory(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let sub = arg_str(args, 0)?.to_ascii_uppercase();
    match sub.as_str() {
        "USAGE" => {
            if args.len() < 2 {
                return Err(wrong_args("memory|usage"));
            }
            let key = arg_str(args, 1)?;
            match ctx.db().peek(key) {
                Some((value, _)) => int((key.len() + value.estimated_size() + 56) as i64),
                None => super::nil(),
            }
        }
        "DOCTOR" => bulk("Sam, I detected a few issues in this Kiln instance memory implants:\n\n * No memory problems found."),
        "STATS" => array(vec![
            Frame::bulk("keys.count"),
            Frame::Integer(ctx.store.total_keys() as i64),
            Frame::bulk("dataset.bytes"),
            Frame::Integer(
                ctx.store
                    .iter_dbs()
                    .flat_map(|(_, db)| db.iter_entries())
                    .map(|(k, v, _)| (k.len() + v.estimated_size()) as i64)
                    .sum(),
            ),
        ]),
        other => Err(ErrorReply::msg(format!(
            "ERR Unknown MEMORY subcommand or wrong number of arguments for '{other}'"
        ))),
    }
}

fn select(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let index = arg_usize(args, 0)
        .map_err(|_| ErrorReply::msg("ERR value is not an integer or out of range"))?;
    if index >= ctx.store.db_count() {
        return Err(ErrorReply::msg("ERR DB index is out of range"));
    }
    ctx.session.db_index = index;
    ok()
}

fn lastsave(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    int(ctx.shared.last_save_unix.load(Ordering::Relaxed) as i64)
}

fn quit(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    ctx.session.should_close = true;
    ok()
}

fn shutdown(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    ctx.session.should_close = true;
    let _ = ctx.shared.shutdown.send(true);
    ok()
}

fn slowlog(_ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let sub = arg_str(args, 0)?.to_ascii_uppercase();
    match sub.as_str() {
        "GET" => array(Vec::new()),
        "LEN" => int(0),
        "RESET" => ok(),
        other => Err(ErrorReply::msg(format!(
            "ERR Unknown SLOWLOG subcommand or wrong number of arguments for '{other}'"
        ))),
    }
}

fn acl(_ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    if args.is_empty() {
        return array(Vec::new());
    }
    match arg_str(args, 0)?.to_ascii_uppercase().as_str() {
        "LIST" => array(vec![Frame::bulk("user default on nopass ~* &* +@all")]),
        "WHOAMI" => bulk("default"),
        "CAT" => array(Vec::new()),
        _ => array(Vec::new()),
    }
}

fn save(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    match snapshotter::save(ctx.store, &ctx.shared.config.dbfilename) {
        Ok(()) => {
            ctx.shared.mark_saved(ctx.store);
            ok()
        }
        Err(e) => Err(ErrorReply::msg(format!("ERR save failed: {e}"))),
    }
}

fn bgsave(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    // structural clone under the lock we already hold; serialization
    // happens on a blocking thread after the reply is sent
    let clone = ctx.store.clone();
    ctx.shared.mark_saved(ctx.store);

    let shared = std::sync::Arc::clone(ctx.shared);
    tokio::task::spawn_blocking(move || {
        match snapshotter::save(&clone, &shared.config.dbfilename) {
            Ok(()) => {
                shared
                    .last_save_unix
                    .store(unix_now_secs(), Ordering::Relaxed);
                tracing::info!("background save complete");
            }
            Err(e) => tracing::error!("background save failed: {e}"),
        }
    });

    simple("Background saving started")
}
