//! List command handlers.
//!
//! The B-variants (BLPOP and friends) are non-blocking probes: the
//! trailing timeout is validated and ignored, and an empty source
//! yields a nil array immediately.

use bytes::Bytes;

use kiln_protocol::Frame;

use super::ErrorReply;
use super::{
    arg_i64, arg_str, arg_string, arg_timeout, arg_usize, array, int, nil, nil_array, ok,
    opt_bulk, syntax_error, Ctx, CommandSpec, Reply, READONLY, WRITE,
};

pub fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec { name: "LPUSH", arity: -3, flags: WRITE, handler: lpush },
        CommandSpec { name: "LPUSHX", arity: -3, flags: WRITE, handler: lpushx },
        CommandSpec { name: "RPUSH", arity: -3, flags: WRITE, handler: rpush },
        CommandSpec { name: "RPUSHX", arity: -3, flags: WRITE, handler: rpushx },
        CommandSpec { name: "LPOP", arity: -2, flags: WRITE, handler: lpop },
        CommandSpec { name: "RPOP", arity: -2, flags: WRITE, handler: rpop },
        CommandSpec { name: "LLEN", arity: 2, flags: READONLY, handler: llen },
        CommandSpec { name: "LRANGE", arity: 4, flags: READONLY, handler: lrange },
        CommandSpec { name: "LINDEX", arity: 3, flags: READONLY, handler: lindex },
        CommandSpec { name: "LSET", arity: 4, flags: WRITE, handler: lset },
        CommandSpec { name: "LINSERT", arity: 5, flags: WRITE, handler: linsert },
        CommandSpec { name: "LREM", arity: 4, flags: WRITE, handler: lrem },
        CommandSpec { name: "LTRIM", arity: 4, flags: WRITE, handler: ltrim },
        CommandSpec { name: "RPOPLPUSH", arity: 3, flags: WRITE, handler: rpoplpush },
        CommandSpec { name: "LMOVE", arity: 5, flags: WRITE, handler: lmove },
        CommandSpec { name: "LPOS", arity: -3, flags: READONLY, handler: lpos },
        CommandSpec { name: "BLPOP", arity: -3, flags: WRITE, handler: blpop },
        CommandSpec { name: "BRPOP", arity: -3, flags: WRITE, handler: brpop },
        CommandSpec { name: "BRPOPLPUSH", arity: 4, flags: WRITE, handler: brpoplpush },
        CommandSpec { name: "BLMOVE", arity: 6, flags: WRITE, handler: blmove },
    ]
}

fn push(ctx: &mut Ctx<'_>, args: &[Bytes], head: bool, require_existing: bool) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let values = args[1..].to_vec();
    match ctx.db().list_push(key, values, head, require_existing)? {
        Some(len) => int(len as i64),
        None => int(0),
    }
}

fn lpush(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    push(ctx, args, true, false)
}

fn lpushx(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    push(ctx, args, true, true)
}

fn rpush(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    push(ctx, args, false, false)
}

fn rpushx(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    push(ctx, args, false, true)
}

fn pop(ctx: &mut Ctx<'_>, args: &[Bytes], head: bool) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let count = match args.len() {
        1 => None,
        2 => Some(arg_usize(args, 1)?),
        _ => return Err(super::wrong_args(if head { "lpop" } else { "rpop" })),
    };

    let popped = ctx.db().list_pop(key, head, count.unwrap_or(1))?;
    match (count, popped) {
        // without COUNT: single bulk or nil
        (None, Some(mut items)) if !items.is_empty() => opt_bulk(Some(items.remove(0))),
        (None, _) => nil(),
        // with COUNT: array of popped elements or nil array
        (Some(_), Some(items)) if !items.is_empty() => {
            array(items.into_iter().map(Frame::Bulk).collect())
        }
        (Some(_), _) => nil_array(),
    }
}

fn lpop(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    pop(ctx, args, true)
}

fn rpop(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    pop(ctx, args, false)
}

fn llen(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    int(ctx.db().list_len(key)? as i64)
}

fn lrange(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let start = arg_i64(args, 1)?;
    let stop = arg_i64(args, 2)?;
    let items = ctx.db().list_range(key, start, stop)?;
    array(items.into_iter().map(Frame::Bulk).collect())
}

fn lindex(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let index = arg_i64(args, 1)?;
    opt_bulk(ctx.db().list_index(key, index)?)
}

fn lset(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let index = arg_i64(args, 1)?;
    ctx.db().list_set(key, index, args[2].clone())?;
    ok()
}

fn linsert(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let before = match arg_str(args, 1)?.to_ascii_uppercase().as_str() {
        "BEFORE" => true,
        "AFTER" => false,
        _ => return Err(syntax_error()),
    };
    let pivot = args[2].clone();
    let value = args[3].clone();
    int(ctx.db().list_insert(key, before, &pivot, value)?)
}

fn lrem(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let count = arg_i64(args, 1)?;
    let value = args[2].clone();
    int(ctx.db().list_rem(key, count, &value)? as i64)
}

fn ltrim(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let start = arg_i64(args, 1)?;
    let stop = arg_i64(args, 2)?;
    ctx.db().list_trim(key, start, stop)?;
    ok()
}

fn rpoplpush(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let src = arg_string(args, 0)?;
    let dst = arg_string(args, 1)?;
    opt_bulk(ctx.db().list_move(&src, &dst, false, true)?)
}

/// Parses a LEFT/RIGHT side token into "is the head side".
fn side(args: &[Bytes], index: usize) -> Result<bool, ErrorReply> {
    match arg_str(args, index)?.to_ascii_uppercase().as_str() {
        "LEFT" => Ok(true),
        "RIGHT" => Ok(false),
        _ => Err(syntax_error()),
    }
}

fn lmove(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let src = arg_string(args, 0)?;
    let dst = arg_string(args, 1)?;
    let from_head = side(args, 2)?;
    let to_head = side(args, 3)?;
    opt_bulk(ctx.db().list_move(&src, &dst, from_head, to_head)?)
}

fn lpos(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let element = args[1].clone();

    let mut rank = 1i64;
    let mut count: Option<usize> = None;
    let mut max_len = 0usize;

    let mut i = 2;
    while i < args.len() {
        match arg_str(args, i)?.to_ascii_uppercase().as_str() {
            "RANK" if i + 1 < args.len() => {
                rank = arg_i64(args, i + 1)?;
                if rank == 0 {
                    return Err(ErrorReply::msg(
                        "ERR RANK can't be zero",
                    ));
                }
                i += 2;
            }
            "COUNT" if i + 1 < args.len() => {
                count = Some(arg_usize(args, i + 1)?);
                i += 2;
            }
            "MAXLEN" if i + 1 < args.len() => {
                max_len = arg_usize(args, i + 1)?;
                i += 2;
            }
            _ => return Err(syntax_error()),
        }
    }

    let positions = ctx
        .db()
        .list_pos(key, &element, rank, count.unwrap_or(1), max_len)?;

    match count {
        // without COUNT: a single index or nil
        None => match positions.first() {
            Some(&idx) => int(idx as i64),
            None => nil(),
        },
        // with COUNT: always an array
        Some(_) => array(positions.into_iter().map(|i| Frame::Integer(i as i64)).collect()),
    }
}

/// Shared body of BLPOP/BRPOP: probe each key in order, return
/// [key, element] for the first hit, nil array otherwise.
fn bpop(ctx: &mut Ctx<'_>, args: &[Bytes], head: bool) -> Result<Reply, ErrorReply> {
    arg_timeout(args, args.len() - 1)?;
    let keys = &args[..args.len() - 1];

    for i in 0..keys.len() {
        let key = arg_string(keys, i)?;
        if let Some(mut items) = ctx.db().list_pop(&key, head, 1)? {
            if let Some(item) = items.pop() {
                return array(vec![Frame::bulk(key), Frame::Bulk(item)]);
            }
        }
    }
    nil_array()
}

fn blpop(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    bpop(ctx, args, true)
}

fn brpop(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    bpop(ctx, args, false)
}

fn brpoplpush(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let src = arg_string(args, 0)?;
    let dst = arg_string(args, 1)?;
    arg_timeout(args, 2)?;
    opt_bulk(ctx.db().list_move(&src, &dst, false, true)?)
}

fn blmove(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let src = arg_string(args, 0)?;
    let dst = arg_string(args, 1)?;
    let from_head = side(args, 2)?;
    let to_head = side(args, 3)?;
    arg_timeout(args, 4)?;
    opt_bulk(ctx.db().list_move(&src, &dst, from_head, to_head)?)
}
