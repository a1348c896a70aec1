//! String command handlers.

use std::time::Duration;

use bytes::Bytes;

use kiln_core::{SetExpiry, SetOutcome};
use kiln_protocol::Frame;

use super::ErrorReply;
use super::{
    arg_i64, arg_str, arg_string, array, bulk, int, nil, ok, opt_bulk, syntax_error, unix_now_ms,
    wrong_args, Ctx, Reply, CommandSpec, READONLY, WRITE,
};

pub fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec { name: "GET", arity: 2, flags: READONLY, handler: get },
        CommandSpec { name: "SET", arity: -3, flags: WRITE, handler: set },
        CommandSpec { name: "SETNX", arity: 3, flags: WRITE, handler: setnx },
        CommandSpec { name: "SETEX", arity: 4, flags: WRITE, handler: setex },
        CommandSpec { name: "PSETEX", arity: 4, flags: WRITE, handler: psetex },
        CommandSpec { name: "GETSET", arity: 3, flags: WRITE, handler: getset },
        CommandSpec { name: "GETDEL", arity: 2, flags: WRITE, handler: getdel },
        CommandSpec { name: "GETEX", arity: -2, flags: WRITE, handler: getex },
        CommandSpec { name: "APPEND", arity: 3, flags: WRITE, handler: append },
        CommandSpec { name: "STRLEN", arity: 2, flags: READONLY, handler: strlen },
        CommandSpec { name: "GETRANGE", arity: 4, flags: READONLY, handler: getrange },
        CommandSpec { name: "SUBSTR", arity: 4, flags: READONLY, handler: getrange },
        CommandSpec { name: "SETRANGE", arity: 4, flags: WRITE, handler: setrange },
        CommandSpec { name: "INCR", arity: 2, flags: WRITE, handler: incr },
        CommandSpec { name: "INCRBY", arity: 3, flags: WRITE, handler: incrby },
        CommandSpec { name: "INCRBYFLOAT", arity: 3, flags: WRITE, handler: incrbyfloat },
        CommandSpec { name: "DECR", arity: 2, flags: WRITE, handler: decr },
        CommandSpec { name: "DECRBY", arity: 3, flags: WRITE, handler: decrby },
        CommandSpec { name: "MGET", arity: -2, flags: READONLY, handler: mget },
        CommandSpec { name: "MSET", arity: -3, flags: WRITE, handler: mset },
        CommandSpec { name: "MSETNX", arity: -3, flags: WRITE, handler: msetnx },
    ]
}

fn get(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    opt_bulk(ctx.db().get_string(key)?)
}

fn set(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    let value = args[1].clone();

    let mut expire = SetExpiry::Discard;
    let mut nx = false;
    let mut xx = false;
    let mut return_old = false;

    let mut i = 2;
    while i < args.len() {
        match arg_str(args, i)?.to_ascii_uppercase().as_str() {
            "EX" if i + 1 < args.len() => {
                expire = SetExpiry::Ttl(Duration::from_secs(expire_amount(args, i + 1, "set")?));
                i += 2;
            }
            "PX" if i + 1 < args.len() => {
                expire = SetExpiry::Ttl(Duration::from_millis(expire_amount(args, i + 1, "set")?));
                i += 2;
            }
            "EXAT" if i + 1 < args.len() => {
                let at_ms = arg_i64(args, i + 1)?.saturating_mul(1000);
                expire = SetExpiry::Ttl(Duration::from_millis(
                    at_ms.saturating_sub(unix_now_ms()).max(0) as u64,
                ));
                i += 2;
            }
            "PXAT" if i + 1 < args.len() => {
                let at_ms = arg_i64(args, i + 1)?;
                expire = SetExpiry::Ttl(Duration::from_millis(
                    at_ms.saturating_sub(unix_now_ms()).max(0) as u64,
                ));
                i += 2;
            }
            "NX" => {
                nx = true;
                i += 1;
            }
            "XX" => {
                xx = true;
                i += 1;
            }
            "KEEPTTL" => {
                expire = SetExpiry::Keep;
                i += 1;
            }
            "GET" => {
                return_old = true;
                i += 1;
            }
            _ => return Err(syntax_error()),
        }
    }
    if nx && xx {
        return Err(syntax_error());
    }

    let old = if return_old {
        Some(ctx.db().get_string(&key)?)
    } else {
        None
    };

    let outcome = ctx.db().set_string(&key, value, expire, nx, xx);

    match (old, outcome) {
        (Some(old), _) => opt_bulk(old),
        (None, SetOutcome::Stored) => ok(),
        (None, SetOutcome::Blocked) => nil(),
    }
}

/// Parses a positive expire amount, matching the Redis error message.
fn expire_amount(args: &[Bytes], index: usize, cmd: &str) -> Result<u64, ErrorReply> {
    let n = arg_i64(args, index)?;
    if n <= 0 {
        return Err(ErrorReply::msg(format!(
            "ERR invalid expire time in '{cmd}' command"
        )));
    }
    Ok(n as u64)
}

fn setnx(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    let stored = ctx
        .db()
        .set_string(&key, args[1].clone(), SetExpiry::Discard, true, false);
    int((stored == SetOutcome::Stored) as i64)
}

fn setex(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    let secs = expire_amount(args, 1, "setex")?;
    ctx.db().set_string(
        &key,
        args[2].clone(),
        SetExpiry::Ttl(Duration::from_secs(secs)),
        false,
        false,
    );
    ok()
}

fn psetex(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    let millis = expire_amount(args, 1, "psetex")?;
    ctx.db().set_string(
        &key,
        args[2].clone(),
        SetExpiry::Ttl(Duration::from_millis(millis)),
        false,
        false,
    );
    ok()
}

fn getset(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    let old = ctx.db().get_string(&key)?;
    ctx.db()
        .set_string(&key, args[1].clone(), SetExpiry::Discard, false, false);
    opt_bulk(old)
}

fn getdel(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    opt_bulk(ctx.db().get_del(key)?)
}

fn getex(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    let value = match ctx.db().get_string(&key)? {
        Some(v) => v,
        None => return nil(),
    };

    let mut i = 1;
    while i < args.len() {
        match arg_str(args, i)?.to_ascii_uppercase().as_str() {
            "EX" if i + 1 < args.len() => {
                let secs = expire_amount(args, i + 1, "getex")?;
                ctx.db().expire_in_ms(&key, (secs as i64).saturating_mul(1000));
                i += 2;
            }
            "PX" if i + 1 < args.len() => {
                let millis = expire_amount(args, i + 1, "getex")?;
                ctx.db().expire_in_ms(&key, millis as i64);
                i += 2;
            }
            "EXAT" if i + 1 < args.len() => {
                let at_ms = arg_i64(args, i + 1)?.saturating_mul(1000);
                ctx.db().expire_in_ms(&key, at_ms.saturating_sub(unix_now_ms()));
                i += 2;
            }
            "PXAT" if i + 1 < args.len() => {
                let at_ms = arg_i64(args, i + 1)?;
                ctx.db().expire_in_ms(&key, at_ms.saturating_sub(unix_now_ms()));
                i += 2;
            }
            "PERSIST" => {
                ctx.db().persist(&key);
                i += 1;
            }
            _ => return Err(syntax_error()),
        }
    }

    bulk(value)
}

fn append(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let value = args[1].clone();
    int(ctx.db().append(key, &value)? as i64)
}

fn strlen(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    int(ctx.db().strlen(key)? as i64)
}

fn getrange(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let start = arg_i64(args, 1)?;
    let end = arg_i64(args, 2)?;
    let data = ctx.db().get_range(key, start, end)?;
    bulk(data)
}

fn setrange(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let offset = arg_i64(args, 1)?;
    if offset < 0 {
        return Err(ErrorReply::msg("ERR offset is out of range"));
    }
    let value = args[2].clone();
    // writing nothing never creates or grows the key
    if value.is_empty() {
        return int(ctx.db().strlen(key)? as i64);
    }
    int(ctx.db().set_range(key, offset as usize, &value)? as i64)
}

fn incr(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    int(ctx.db().incr_by(key, 1)?)
}

fn incrby(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let delta = arg_i64(args, 1)?;
    int(ctx.db().incr_by(key, delta)?)
}

fn incrbyfloat(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let delta: f64 = arg_str(args, 1)?
        .parse()
        .map_err(|_| super::not_a_float())?;
    if delta.is_nan() {
        return Err(super::not_a_float());
    }
    let new_val = ctx.db().incr_by_float(key, delta)?;
    bulk(new_val)
}

fn decr(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    int(ctx.db().incr_by(key, -1)?)
}

fn decrby(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let delta = arg_i64(args, 1)?;
    int(ctx.db().incr_by(key, delta.checked_neg().ok_or_else(super::not_an_integer)?)?)
}

fn mget(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let mut out = Vec::with_capacity(args.len());
    for i in 0..args.len() {
        let key = arg_str(args, i)?;
        // non-string keys read as nil rather than erroring
        let value = ctx.db().get_string(key).unwrap_or(None);
        out.push(match value {
            Some(v) => Frame::Bulk(v),
            None => Frame::NullBulk,
        });
    }
    array(out)
}

fn mset(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    if args.len() % 2 != 0 {
        return Err(wrong_args("mset"));
    }
    for pair in args.chunks(2) {
        let key = std::str::from_utf8(&pair[0])
            .map_err(|_| ErrorReply::msg("ERR invalid argument encoding"))?;
        ctx.db()
            .set_string(key, pair[1].clone(), SetExpiry::Discard, false, false);
    }
    ok()
}

fn msetnx(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    if args.len() % 2 != 0 {
        return Err(wrong_args("msetnx"));
    }
    // all-or-nothing: probe every key first
    for pair in args.chunks(2) {
        let key = std::str::from_utf8(&pair[0])
            .map_err(|_| ErrorReply::msg("ERR invalid argument encoding"))?;
        if ctx.db().exists(key) {
            return int(0);
        }
    }
    for pair in args.chunks(2) {
        let key = std::str::from_utf8(&pair[0])
            .map_err(|_| ErrorReply::msg("ERR invalid argument encoding"))?;
        ctx.db()
            .set_string(key, pair[1].clone(), SetExpiry::Discard, false, false);
    }
    int(1)
}
