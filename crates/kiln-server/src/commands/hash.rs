//! Hash command handlers.

use bytes::Bytes;

use kiln_protocol::Frame;

use super::ErrorReply;
use super::{
    arg_i64, arg_str, arg_string, array, int, nil, opt_bulk, parse_scan_opts, wrong_args, Ctx,
    CommandSpec, Reply, READONLY, WRITE,
};

pub fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec { name: "HSET", arity: -4, flags: WRITE, handler: hset },
        CommandSpec { name: "HSETNX", arity: 4, flags: WRITE, handler: hsetnx },
        CommandSpec { name: "HGET", arity: 3, flags: READONLY, handler: hget },
        CommandSpec { name: "HMSET", arity: -4, flags: WRITE, handler: hmset },
        CommandSpec { name: "HMGET", arity: -3, flags: READONLY, handler: hmget },
        CommandSpec { name: "HDEL", arity: -3, flags: WRITE, handler: hdel },
        CommandSpec { name: "HEXISTS", arity: 3, flags: READONLY, handler: hexists },
        CommandSpec { name: "HLEN", arity: 2, flags: READONLY, handler: hlen },
        CommandSpec { name: "HKEYS", arity: 2, flags: READONLY, handler: hkeys },
        CommandSpec { name: "HVALS", arity: 2, flags: READONLY, handler: hvals },
        CommandSpec { name: "HGETALL", arity: 2, flags: READONLY, handler: hgetall },
        CommandSpec { name: "HINCRBY", arity: 4, flags: WRITE, handler: hincrby },
        CommandSpec { name: "HINCRBYFLOAT", arity: 4, flags: WRITE, handler: hincrbyfloat },
        CommandSpec { name: "HSTRLEN", arity: 3, flags: READONLY, handler: hstrlen },
        CommandSpec { name: "HRANDFIELD", arity: -2, flags: READONLY, handler: hrandfield },
        CommandSpec { name: "HSCAN", arity: -3, flags: READONLY, handler: hscan },
    ]
}

fn pairs_from(args: &[Bytes], cmd: &str) -> Result<Vec<(String, Bytes)>, ErrorReply> {
    if args.len() % 2 != 0 {
        return Err(wrong_args(cmd));
    }
    args.chunks(2)
        .map(|pair| {
            let field = std::str::from_utf8(&pair[0])
                .map_err(|_| ErrorReply::msg("ERR invalid argument encoding"))?;
            Ok((field.to_owned(), pair[1].clone()))
        })
        .collect()
}

fn hset(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let pairs = pairs_from(&args[1..], "hset")?;
    int(ctx.db().hash_set(key, pairs)? as i64)
}

fn hsetnx(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let field = arg_string(args, 1)?;
    int(ctx.db().hash_set_nx(key, field, args[2].clone())? as i64)
}

fn hget(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let field = arg_str(args, 1)?;
    opt_bulk(ctx.db().hash_get(key, field)?)
}

/// HMSET is the deprecated HSET form replying +OK.
fn hmset(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let pairs = pairs_from(&args[1..], "hmset")?;
    ctx.db().hash_set(key, pairs)?;
    super::ok()
}

fn hmget(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let fields: Vec<String> = (1..args.len())
        .map(|i| arg_string(args, i))
        .collect::<Result<_, _>>()?;
    let values = ctx.db().hash_mget(key, &fields)?;
    array(
        values
            .into_iter()
            .map(|v| match v {
                Some(data) => Frame::Bulk(data),
                None => Frame::NullBulk,
            })
            .collect(),
    )
}

fn hdel(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let fields: Vec<String> = (1..args.len())
        .map(|i| arg_string(args, i))
        .collect::<Result<_, _>>()?;
    int(ctx.db().hash_del(key, &fields)? as i64)
}

fn hexists(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let field = arg_str(args, 1)?;
    int(ctx.db().hash_exists(key, field)? as i64)
}

fn hlen(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    int(ctx.db().hash_len(key)? as i64)
}

fn hkeys(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let all = ctx.db().hash_get_all(key)?;
    array(all.into_iter().map(|(f, _)| Frame::bulk(f)).collect())
}

fn hvals(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let all = ctx.db().hash_get_all(key)?;
    array(all.into_iter().map(|(_, v)| Frame::Bulk(v)).collect())
}

fn hgetall(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let all = ctx.db().hash_get_all(key)?;
    let mut out = Vec::with_capacity(all.len() * 2);
    for (field, value) in all {
        out.push(Frame::bulk(field));
        out.push(Frame::Bulk(value));
    }
    array(out)
}

fn hincrby(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let field = arg_str(args, 1)?;
    let delta = arg_i64(args, 2)?;
    int(ctx.db().hash_incr_by(key, field, delta)?)
}

fn hincrbyfloat(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let field = arg_str(args, 1)?;
    let delta: f64 = arg_str(args, 2)?
        .parse()
        .map_err(|_| super::not_a_float())?;
    if delta.is_nan() {
        return Err(super::not_a_float());
    }
    let new_val = ctx.db().hash_incr_by_float(key, field, delta)?;
    super::bulk(new_val)
}

fn hstrlen(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let field = arg_str(args, 1)?;
    int(ctx.db().hash_strlen(key, field)? as i64)
}

fn hrandfield(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let (count, with_values) = match args.len() {
        1 => (None, false),
        2 => (Some(arg_i64(args, 1)?), false),
        3 => {
            if !arg_str(args, 2)?.eq_ignore_ascii_case("WITHVALUES") {
                return Err(super::syntax_error());
            }
            (Some(arg_i64(args, 1)?), true)
        }
        _ => return Err(super::syntax_error()),
    };

    let mut fields = ctx.db().hash_rand_fields(key, count)?;
    match count {
        None => match fields.pop() {
            Some((field, _)) => opt_bulk(Some(Bytes::from(field))),
            None => nil(),
        },
        Some(_) if with_values => {
            let mut out = Vec::with_capacity(fields.len() * 2);
            for (field, value) in fields {
                out.push(Frame::bulk(field));
                out.push(Frame::Bulk(value));
            }
            array(out)
        }
        Some(_) => array(fields.into_iter().map(|(f, _)| Frame::bulk(f)).collect()),
    }
}

fn hscan(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let cursor: u64 = arg_str(args, 1)?
        .parse()
        .map_err(|_| ErrorReply::msg("ERR invalid cursor"))?;
    let (pattern, count) = parse_scan_opts(&args[2..])?;

    let (next, pairs) = ctx.db().hash_scan(key, cursor, count, pattern.as_deref())?;
    let mut flat = Vec::with_capacity(pairs.len() * 2);
    for (field, value) in pairs {
        flat.push(Frame::bulk(field));
        flat.push(Frame::Bulk(value));
    }
    array(vec![
        Frame::bulk(next.to_string()),
        Frame::Array(flat),
    ])
}
