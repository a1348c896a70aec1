//! Set command handlers.

use bytes::Bytes;

use kiln_protocol::Frame;

use super::ErrorReply;
use super::{
    arg_i64, arg_str, arg_string, arg_usize, array, int, nil, opt_bulk, parse_scan_opts,
    syntax_error, Ctx, CommandSpec, Reply, READONLY, WRITE,
};

pub fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec { name: "SADD", arity: -3, flags: WRITE, handler: sadd },
        CommandSpec { name: "SREM", arity: -3, flags: WRITE, handler: srem },
        CommandSpec { name: "SISMEMBER", arity: 3, flags: READONLY, handler: sismember },
        CommandSpec { name: "SMISMEMBER", arity: -3, flags: READONLY, handler: smismember },
        CommandSpec { name: "SMEMBERS", arity: 2, flags: READONLY, handler: smembers },
        CommandSpec { name: "SCARD", arity: 2, flags: READONLY, handler: scard },
        CommandSpec { name: "SPOP", arity: -2, flags: WRITE, handler: spop },
        CommandSpec { name: "SRANDMEMBER", arity: -2, flags: READONLY, handler: srandmember },
        CommandSpec { name: "SMOVE", arity: 4, flags: WRITE, handler: smove },
        CommandSpec { name: "SUNION", arity: -2, flags: READONLY, handler: sunion },
        CommandSpec { name: "SUNIONSTORE", arity: -3, flags: WRITE, handler: sunionstore },
        CommandSpec { name: "SINTER", arity: -2, flags: READONLY, handler: sinter },
        CommandSpec { name: "SINTERSTORE", arity: -3, flags: WRITE, handler: sinterstore },
        CommandSpec { name: "SINTERCARD", arity: -3, flags: READONLY, handler: sintercard },
        CommandSpec { name: "SDIFF", arity: -2, flags: READONLY, handler: sdiff },
        CommandSpec { name: "SDIFFSTORE", arity: -3, flags: WRITE, handler: sdiffstore },
        CommandSpec { name: "SSCAN", arity: -3, flags: READONLY, handler: sscan },
    ]
}

fn members_from(args: &[Bytes]) -> Result<Vec<String>, ErrorReply> {
    (0..args.len()).map(|i| arg_string(args, i)).collect()
}

fn sadd(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let members = members_from(&args[1..])?;
    int(ctx.db().set_add(key, members)? as i64)
}

fn srem(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let members = members_from(&args[1..])?;
    int(ctx.db().set_rem(key, &members)? as i64)
}

fn sismember(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let member = arg_str(args, 1)?;
    int(ctx.db().set_contains(key, member)? as i64)
}

fn smismember(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    let mut out = Vec::with_capacity(args.len() - 1);
    for i in 1..args.len() {
        let member = arg_str(args, i)?;
        out.push(Frame::Integer(ctx.db().set_contains(&key, member)? as i64));
    }
    array(out)
}

fn smembers(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let members = ctx.db().set_members(key)?;
    array(members.into_iter().map(Frame::bulk).collect())
}

fn scard(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    int(ctx.db().set_card(key)? as i64)
}

fn spop(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let count = match args.len() {
        1 => None,
        2 => Some(arg_usize(args, 1)?),
        _ => return Err(super::wrong_args("spop")),
    };

    let mut popped = ctx.db().set_pop(key, count.unwrap_or(1))?;
    match count {
        None => match popped.pop() {
            Some(member) => opt_bulk(Some(Bytes::from(member))),
            None => nil(),
        },
        Some(_) => array(popped.into_iter().map(Frame::bulk).collect()),
    }
}

fn srandmember(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let count = match args.len() {
        1 => None,
        2 => Some(arg_i64(args, 1)?),
        _ => return Err(super::wrong_args("srandmember")),
    };

    let mut members = ctx.db().set_rand_members(key, count)?;
    match count {
        None => match members.pop() {
            Some(member) => opt_bulk(Some(Bytes::from(member))),
            None => nil(),
        },
        Some(_) => array(members.into_iter().map(Frame::bulk).collect()),
    }
}

fn smove(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let src = arg_string(args, 0)?;
    let dst = arg_string(args, 1)?;
    let member = arg_str(args, 2)?;
    int(ctx.db().set_move(&src, &dst, member)? as i64)
}

fn sunion(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let keys = members_from(args)?;
    let members = ctx.db().set_union(&keys)?;
    array(members.into_iter().map(Frame::bulk).collect())
}

fn sunionstore(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let dst = arg_string(args, 0)?;
    let keys = members_from(&args[1..])?;
    let members = ctx.db().set_union(&keys)?;
    int(ctx.db().set_store(&dst, members) as i64)
}

fn sinter(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let keys = members_from(args)?;
    let members = ctx.db().set_inter(&keys)?;
    array(members.into_iter().map(Frame::bulk).collect())
}

fn sinterstore(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let dst = arg_string(args, 0)?;
    let keys = members_from(&args[1..])?;
    let members = ctx.db().set_inter(&keys)?;
    int(ctx.db().set_store(&dst, members) as i64)
}

fn sintercard(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let numkeys = arg_usize(args, 0)?;
    if numkeys == 0 || args.len() < 1 + numkeys {
        return Err(syntax_error());
    }
    let keys = members_from(&args[1..1 + numkeys])?;

    // optional LIMIT n; 0 = unlimited
    let mut limit = 0usize;
    let rest = &args[1 + numkeys..];
    if !rest.is_empty() {
        if rest.len() != 2 || !arg_str(rest, 0)?.eq_ignore_ascii_case("LIMIT") {
            return Err(syntax_error());
        }
        limit = arg_usize(rest, 1)?;
    }

    let members = ctx.db().set_inter(&keys)?;
    let card = if limit == 0 {
        members.len()
    } else {
        members.len().min(limit)
    };
    int(card as i64)
}

fn sdiff(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let keys = members_from(args)?;
    let members = ctx.db().set_diff(&keys)?;
    array(members.into_iter().map(Frame::bulk).collect())
}

fn sdiffstore(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let dst = arg_string(args, 0)?;
    let keys = members_from(&args[1..])?;
    let members = ctx.db().set_diff(&keys)?;
    int(ctx.db().set_store(&dst, members) as i64)
}

fn sscan(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let cursor: u64 = arg_str(args, 1)?
        .parse()
        .map_err(|_| ErrorReply::msg("ERR invalid cursor"))?;
    let (pattern, count) = parse_scan_opts(&args[2..])?;

    let (next, members) = ctx.db().set_scan(key, cursor, count, pattern.as_deref())?;
    array(vec![
        Frame::bulk(next.to_string()),
        Frame::Array(members.into_iter().map(Frame::bulk).collect()),
    ])
}
