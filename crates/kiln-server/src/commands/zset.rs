//! Sorted-set command handlers.

use bytes::Bytes;

use kiln_core::{format_float, ScoreBound, ZAddFlags};
use kiln_protocol::Frame;

use super::ErrorReply;
use super::{
    arg_f64, arg_str, arg_string, arg_timeout, arg_usize, array, bulk, int, nil, nil_array,
    parse_scan_opts, syntax_error, wrong_args, Ctx, CommandSpec, Reply, READONLY, WRITE,
};

pub fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec { name: "ZADD", arity: -4, flags: WRITE, handler: zadd },
        CommandSpec { name: "ZREM", arity: -3, flags: WRITE, handler: zrem },
        CommandSpec { name: "ZSCORE", arity: 3, flags: READONLY, handler: zscore },
        CommandSpec { name: "ZRANK", arity: -3, flags: READONLY, handler: zrank },
        CommandSpec { name: "ZREVRANK", arity: -3, flags: READONLY, handler: zrevrank },
        CommandSpec { name: "ZRANGE", arity: -4, flags: READONLY, handler: zrange },
        CommandSpec { name: "ZREVRANGE", arity: -4, flags: READONLY, handler: zrevrange },
        CommandSpec { name: "ZRANGEBYSCORE", arity: -4, flags: READONLY, handler: zrangebyscore },
        CommandSpec { name: "ZREVRANGEBYSCORE", arity: -4, flags: READONLY, handler: zrevrangebyscore },
        CommandSpec { name: "ZCARD", arity: 2, flags: READONLY, handler: zcard },
        CommandSpec { name: "ZCOUNT", arity: 4, flags: READONLY, handler: zcount },
        CommandSpec { name: "ZINCRBY", arity: 4, flags: WRITE, handler: zincrby },
        CommandSpec { name: "ZPOPMIN", arity: -2, flags: WRITE, handler: zpopmin },
        CommandSpec { name: "ZPOPMAX", arity: -2, flags: WRITE, handler: zpopmax },
        CommandSpec { name: "ZMSCORE", arity: -3, flags: READONLY, handler: zmscore },
        CommandSpec { name: "ZRANGESTORE", arity: -5, flags: WRITE, handler: zrangestore },
        CommandSpec { name: "ZSCAN", arity: -3, flags: READONLY, handler: zscan },
        CommandSpec { name: "BZPOPMIN", arity: -3, flags: WRITE, handler: bzpopmin },
        CommandSpec { name: "BZPOPMAX", arity: -3, flags: WRITE, handler: bzpopmax },
    ]
}

fn score_bound(args: &[Bytes], index: usize) -> Result<ScoreBound, ErrorReply> {
    arg_str(args, index)?
        .parse()
        .map_err(|_| ErrorReply::msg("ERR min or max is not a float"))
}

/// Flattens (member, score) pairs into the reply shape, appending
/// scores only when requested.
fn scored_reply(items: Vec<(String, f64)>, with_scores: bool) -> Result<Reply, ErrorReply> {
    let mut out = Vec::with_capacity(items.len() * if with_scores { 2 } else { 1 });
    for (member, score) in items {
        out.push(Frame::bulk(member));
        if with_scores {
            out.push(Frame::bulk(format_float(score)));
        }
    }
    array(out)
}

fn zadd(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;

    let mut flags = ZAddFlags::default();
    let mut incr = false;
    let mut i = 1;
    while i < args.len() {
        match arg_str(args, i)?.to_ascii_uppercase().as_str() {
            "NX" => flags.nx = true,
            "XX" => flags.xx = true,
            "GT" => flags.gt = true,
            "LT" => flags.lt = true,
            "CH" => flags.ch = true,
            "INCR" => incr = true,
            _ => break,
        }
        i += 1;
    }

    if flags.nx && flags.xx {
        return Err(ErrorReply::msg(
            "ERR XX and NX options at the same time are not compatible",
        ));
    }
    if (flags.gt && flags.lt) || (flags.nx && (flags.gt || flags.lt)) {
        return Err(ErrorReply::msg(
            "ERR GT, LT, and/or NX options at the same time are not compatible",
        ));
    }

    let rest = &args[i..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(syntax_error());
    }

    if incr {
        if rest.len() != 2 {
            return Err(ErrorReply::msg(
                "ERR INCR option supports a single increment-element pair",
            ));
        }
        let delta = arg_f64(rest, 0)?;
        let member = arg_str(rest, 1)?;
        return match ctx.db().zset_add_incr(&key, flags, delta, member)? {
            Some(score) => bulk(format_float(score)),
            None => nil(),
        };
    }

    let mut members = Vec::with_capacity(rest.len() / 2);
    for pair in rest.chunks(2) {
        let score = arg_f64(pair, 0)?;
        let member = arg_string(pair, 1)?;
        members.push((score, member));
    }

    int(ctx.db().zset_add(&key, flags, members)? as i64)
}

fn zrem(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let members: Vec<String> = (1..args.len())
        .map(|i| arg_string(args, i))
        .collect::<Result<_, _>>()?;
    int(ctx.db().zset_rem(key, &members)? as i64)
}

fn zscore(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let member = arg_str(args, 1)?;
    match ctx.db().zset_score(key, member)? {
        Some(score) => bulk(format_float(score)),
        None => nil(),
    }
}

fn rank_reply(
    ctx: &mut Ctx<'_>,
    args: &[Bytes],
    rev: bool,
) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    let member = arg_string(args, 1)?;
    let with_score = match args.len() {
        2 => false,
        3 if arg_str(args, 2)?.eq_ignore_ascii_case("WITHSCORE") => true,
        _ => return Err(syntax_error()),
    };

    let rank = ctx.db().zset_rank(&key, &member, rev)?;
    match rank {
        None if with_score => nil_array(),
        None => nil(),
        Some(r) if with_score => {
            let score = ctx.db().zset_score(&key, &member)?.unwrap_or(0.0);
            array(vec![
                Frame::Integer(r as i64),
                Frame::bulk(format_float(score)),
            ])
        }
        Some(r) => int(r as i64),
    }
}

fn zrank(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    rank_reply(ctx, args, false)
}

fn zrevrank(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    rank_reply(ctx, args, true)
}

/// Options shared by ZRANGE and ZRANGESTORE after the two range
/// tokens.
struct RangeOpts {
    by_score: bool,
    rev: bool,
    offset: usize,
    count: i64,
    with_scores: bool,
}

fn parse_range_opts(args: &[Bytes], allow_withscores: bool) -> Result<RangeOpts, ErrorReply> {
    let mut opts = RangeOpts {
        by_score: false,
        rev: false,
        offset: 0,
        count: -1,
        with_scores: false,
    };
    let mut has_limit = false;

    let mut i = 0;
    while i < args.len() {
        match arg_str(args, i)?.to_ascii_uppercase().as_str() {
            "BYSCORE" => {
                opts.by_score = true;
                i += 1;
            }
            "REV" => {
                opts.rev = true;
                i += 1;
            }
            "LIMIT" if i + 2 < args.len() => {
                opts.offset = arg_usize(args, i + 1)?;
                opts.count = super::arg_i64(args, i + 2)?;
                has_limit = true;
                i += 3;
            }
            "WITHSCORES" if allow_withscores => {
                opts.with_scores = true;
                i += 1;
            }
            _ => return Err(syntax_error()),
        }
    }

    if has_limit && !opts.by_score {
        return Err(ErrorReply::msg(
            "ERR syntax error, LIMIT is only supported in combination with BYSCORE",
        ));
    }
    Ok(opts)
}

/// Evaluates a ZRANGE/ZRANGESTORE source range. For BYSCORE with REV
/// the two tokens arrive as (max, min).
fn range_items(
    ctx: &mut Ctx<'_>,
    key: &str,
    start_tok: &[Bytes],
    opts: &RangeOpts,
) -> Result<Vec<(String, f64)>, ErrorReply> {
    if opts.by_score {
        let (min_idx, max_idx) = if opts.rev { (1, 0) } else { (0, 1) };
        let min = score_bound(start_tok, min_idx)?;
        let max = score_bound(start_tok, max_idx)?;
        Ok(ctx
            .db()
            .zset_range_by_score(key, min, max, opts.rev, opts.offset, opts.count)?)
    } else {
        let start = super::arg_i64(start_tok, 0)?;
        let stop = super::arg_i64(start_tok, 1)?;
        Ok(ctx.db().zset_range_by_rank(key, start, stop, opts.rev)?)
    }
}

fn zrange(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    let opts = parse_range_opts(&args[3..], true)?;
    let items = range_items(ctx, &key, &args[1..3], &opts)?;
    scored_reply(items, opts.with_scores)
}

fn zrevrange(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let start = super::arg_i64(args, 1)?;
    let stop = super::arg_i64(args, 2)?;
    let with_scores = match args.len() {
        3 => false,
        4 if arg_str(args, 3)?.eq_ignore_ascii_case("WITHSCORES") => true,
        _ => return Err(syntax_error()),
    };
    let items = ctx.db().zset_range_by_rank(key, start, stop, true)?;
    scored_reply(items, with_scores)
}

fn by_score(
    ctx: &mut Ctx<'_>,
    args: &[Bytes],
    rev: bool,
) -> Result<Reply, ErrorReply> {
    let key = arg_string(args, 0)?;
    // ZREVRANGEBYSCORE takes (max, min)
    let (min_idx, max_idx) = if rev { (2, 1) } else { (1, 2) };
    let min = score_bound(args, min_idx)?;
    let max = score_bound(args, max_idx)?;

    let mut with_scores = false;
    let mut offset = 0usize;
    let mut count = -1i64;

    let mut i = 3;
    while i < args.len() {
        match arg_str(args, i)?.to_ascii_uppercase().as_str() {
            "WITHSCORES" => {
                with_scores = true;
                i += 1;
            }
            "LIMIT" if i + 2 < args.len() => {
                offset = arg_usize(args, i + 1)?;
                count = super::arg_i64(args, i + 2)?;
                i += 3;
            }
            _ => return Err(syntax_error()),
        }
    }

    let items = ctx
        .db()
        .zset_range_by_score(&key, min, max, rev, offset, count)?;
    scored_reply(items, with_scores)
}

fn zrangebyscore(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    by_score(ctx, args, false)
}

fn zrevrangebyscore(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    by_score(ctx, args, true)
}

fn zcard(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    int(ctx.db().zset_card(key)? as i64)
}

fn zcount(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let min = score_bound(args, 1)?;
    let max = score_bound(args, 2)?;
    int(ctx.db().zset_count(key, min, max)? as i64)
}

fn zincrby(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let delta = arg_f64(args, 1)?;
    let member = arg_str(args, 2)?;
    let new_score = ctx.db().zset_incr_by(key, delta, member)?;
    bulk(format_float(new_score))
}

fn zpop(ctx: &mut Ctx<'_>, args: &[Bytes], max: bool) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let count = match args.len() {
        1 => 1,
        2 => arg_usize(args, 1)?,
        _ => return Err(wrong_args(if max { "zpopmax" } else { "zpopmin" })),
    };
    let popped = ctx.db().zset_pop(key, max, count)?;
    scored_reply(popped, true)
}

fn zpopmin(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    zpop(ctx, args, false)
}

fn zpopmax(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    zpop(ctx, args, true)
}

fn zmscore(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let members: Vec<String> = (1..args.len())
        .map(|i| arg_string(args, i))
        .collect::<Result<_, _>>()?;
    let scores = ctx.db().zset_mscore(key, &members)?;
    array(
        scores
            .into_iter()
            .map(|s| match s {
                Some(score) => Frame::bulk(format_float(score)),
                None => Frame::NullBulk,
            })
            .collect(),
    )
}

fn zrangestore(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let dst = arg_string(args, 0)?;
    let src = arg_string(args, 1)?;
    let opts = parse_range_opts(&args[4..], false)?;
    let items = range_items(ctx, &src, &args[2..4], &opts)?;
    int(ctx.db().zset_store(&dst, items) as i64)
}

fn zscan(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let key = arg_str(args, 0)?;
    let cursor: u64 = arg_str(args, 1)?
        .parse()
        .map_err(|_| ErrorReply::msg("ERR invalid cursor"))?;
    let (pattern, count) = parse_scan_opts(&args[2..])?;

    let (next, members) = ctx.db().zset_scan(key, cursor, count, pattern.as_deref())?;
    let mut flat = Vec::with_capacity(members.len() * 2);
    for (member, score) in members {
        flat.push(Frame::bulk(member));
        flat.push(Frame::bulk(format_float(score)));
    }
    array(vec![
        Frame::bulk(next.to_string()),
        Frame::Array(flat),
    ])
}

/// Shared body of BZPOPMIN/BZPOPMAX: probe each key in order, return
/// [key, member, score] for the first hit, nil array otherwise.
fn bzpop(ctx: &mut Ctx<'_>, args: &[Bytes], max: bool) -> Result<Reply, ErrorReply> {
    arg_timeout(args, args.len() - 1)?;
    let keys = &args[..args.len() - 1];

    for i in 0..keys.len() {
        let key = arg_string(keys, i)?;
        let popped = ctx.db().zset_pop(&key, max, 1)?;
        if let Some((member, score)) = popped.into_iter().next() {
            return array(vec![
                Frame::bulk(key),
                Frame::bulk(member),
                Frame::bulk(format_float(score)),
            ]);
        }
    }
    nil_array()
}

fn bzpopmin(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    bzpop(ctx, args, false)
}

fn bzpopmax(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    bzpop(ctx, args, true)
}
