//! Generic key management command handlers.

use bytes::Bytes;

use kiln_core::TtlResult;
use kiln_protocol::Frame;

use super::ErrorReply;
use super::{
    arg_i64, arg_str, arg_string, array, bulk, int, nil, ok, parse_scan_opts, unix_now_ms,
    Ctx, CommandSpec, Reply, READONLY, WRITE,
};
use crate::snapshotter;

pub fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec { name: "DEL", arity: -2, flags: WRITE, handler: del },
        CommandSpec { name: "EXISTS", arity: -2, flags: READONLY, handler: exists },
        CommandSpec { name: "KEYS", arity: -1, flags: READONLY, handler: keys },
        CommandSpec { name: "TYPE", arity: 2, flags: READONLY, handler: type_ },
        CommandSpec { name: "RENAME", arity: 3, flags: WRITE, handler: rename },
        CommandSpec { name: "RENAMENX", arity: 3, flags: WRITE, handler: renamenx },
        CommandSpec { name: "EXPIRE", arity: 3, flags: WRITE, handler: expire },
        CommandSpec { name: "EXPIREAT", arity: 3, flags: WRITE, handler: expireat },
        CommandSpec { name: "PEXPIRE", arity: 3, flags: WRITE, handler: pexpire },
        CommandSpec { name: "TTL", arity: 2, flags: READONLY, handler: ttl },
        CommandSpec { name: "PTTL", arity: 2, flags: READONLY, handler: pttl },
        CommandSpec { name: "PERSIST", arity: 2, flags: WRITE, handler: persist },
        CommandSpec { name: "RANDOMKEY", arity: 1, flags: READONLY, handler: randomkey },
        CommandSpec { name: "SCAN", arity: -2, flags: READONLY, handler: scan },
        CommandSpec { name: "TOUCH", arity: -2, flags: READONLY, handler: touch },
        CommandSpec { name: "UNLINK", arity: -2, flags: WRITE, handler: del },
        CommandSpec { name: "DUMP", arity: 2, flags: READONLY, handler: dump },
        CommandSpec { name: "OBJECT", arity: -2, flags: READONLY, handler: object },
    ]
}

fn del(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let mut removed = 0;
    for i in 0..args.len() {
        let key = arg_str(args, i)?;
        if ctx.db().del(key) {
            removed += 1;
        }
    }
    int(removed)
}

fn exists(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let mut found = 0;
    for i in 0..args.len() {
        let key = arg_str(args, i)?;
        if ctx.db().exists(key) {
            found += 1;
        }
    }
    int(found)
}

fn keys(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let pattern = if args.is_empty() {
        "*"
    } else {
        arg_str(args, 0)?
    };
    let keys = ctx.db().keys(pattern);
    array(keys.into_iter().map(Frame::bulk).collect())
}

fn type_(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    super::simple(ctx.db().value_type(key))
}

fn rename(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    let newkey = arg_string(args, 1)?;
    ctx.db().rename(&key, &newkey)?;
    ok()
}

fn renamenx(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    let newkey = arg_string(args, 1)?;
    if ctx.db().exists(&newkey) {
        return int(0);
    }
    ctx.db().rename(&key, &newkey)?;
    int(1)
}

fn expire(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let seconds = arg_i64(args, 1)?;
    int(ctx.db().expire_in_ms(key, seconds.saturating_mul(1000)) as i64)
}

fn expireat(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let at_secs = arg_i64(args, 1)?;
    let remaining = at_secs.saturating_mul(1000).saturating_sub(unix_now_ms());
    int(ctx.db().expire_in_ms(key, remaining) as i64)
}

fn pexpire(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let millis = arg_i64(args, 1)?;
    int(ctx.db().expire_in_ms(key, millis) as i64)
}

fn ttl_frame(result: TtlResult) -> Result<Reply, ErrorReply> {
    match result {
        TtlResult::Remaining(n) => int(n as i64),
        TtlResult::NoExpiry => int(-1),
        TtlResult::NotFound => int(-2),
    }
}

fn ttl(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let result = ctx.db().ttl_secs(key);
    ttl_frame(result)
}

fn pttl(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let result = ctx.db().ttl_ms(key);
    ttl_frame(result)
}

fn persist(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    int(ctx.db().persist(key) as i64)
}

fn randomkey(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    match ctx.db().random_key() {
        Some(key) => bulk(key),
        None => nil(),
    }
}

fn scan(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let cursor: u64 = arg_str(args, 0)?
        .parse()
        .map_err(|_| ErrorReply::msg("ERR invalid cursor"))?;
    let (pattern, count) = parse_scan_opts(&args[1..])?;

    let (next, keys) = ctx.db().scan_keys(cursor, count, pattern.as_deref());
    array(vec![
        Frame::bulk(next.to_string()),
        Frame::Array(keys.into_iter().map(Frame::bulk).collect()),
    ])
}

/// TOUCH without LRU tracking degenerates to an existence count.
fn touch(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    exists(ctx, args)
}

fn dump(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    match ctx.db().peek(key) {
        Some((value, _)) => {
            let encoded = snapshotter::encode_value(value)
                .map_err(|_| ErrorReply::msg("ERR dump failed"))?;
            bulk(encoded)
        }
        None => nil(),
    }
}

fn object(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let sub = arg_str(args, 0)?.to_ascii_uppercase();
    match sub.as_str() {
        "ENCODING" => {
            let key = arg_str(args, 1)?;
            match ctx.db().value_type(key) {
                "string" => bulk("embstr"),
                "none" => nil(),
                // collections report the compact listpack encoding
                _ => bulk("listpack"),
            }
        }
        "FREQ" | "IDLETIME" => {
            arg_str(args, 1)?;
            int(0)
        }
        "REFCOUNT" => {
            arg_str(args, 1)?;
            int(1)
        }
        other => Err(ErrorReply::msg(format!(
            "ERR Unknown OBJECT subcommand '{other}'"
        ))),
    }
}
