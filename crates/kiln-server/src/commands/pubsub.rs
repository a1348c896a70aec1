//! Pub/sub command handlers.
//!
//! SUBSCRIBE-family commands mutate the session's subscription sets
//! and register its push queue with the hub; each affected channel or
//! pattern gets its own confirmation frame, so these handlers return
//! [`Reply::Many`]. PUBLISH fans out under the keyspace lock the
//! dispatcher already holds.

use bytes::Bytes;

use kiln_protocol::Frame;

use super::ErrorReply;
use super::{arg_str, arg_string, array, int, Ctx, CommandSpec, Reply, PUBSUB, READONLY};

pub fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec { name: "SUBSCRIBE", arity: -2, flags: PUBSUB, handler: subscribe },
        CommandSpec { name: "UNSUBSCRIBE", arity: -1, flags: PUBSUB, handler: unsubscribe },
        CommandSpec { name: "PSUBSCRIBE", arity: -2, flags: PUBSUB, handler: psubscribe },
        CommandSpec { name: "PUNSUBSCRIBE", arity: -1, flags: PUBSUB, handler: punsubscribe },
        CommandSpec { name: "PUBLISH", arity: 3, flags: READONLY, handler: publish },
        CommandSpec { name: "PUBSUB", arity: -2, flags: READONLY, handler: pubsub },
    ]
}

/// One confirmation frame: [kind, channel, subscription-count].
fn confirmation(kind: &str, target: Option<&str>, count: usize) -> Frame {
    Frame::Array(vec![
        Frame::bulk(kind.to_owned()),
        match target {
            Some(t) => Frame::bulk(t.to_owned()),
            None => Frame::NullBulk,
        },
        Frame::Integer(count as i64),
    ])
}

fn subscribe(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let mut frames = Vec::with_capacity(args.len());
    for i in 0..args.len() {
        let channel = arg_string(args, i)?;
        if ctx.session.channels.insert(channel.clone()) {
            ctx.shared
                .pubsub
                .subscribe(&channel, ctx.session.id, ctx.session.push_tx.clone());
        }
        frames.push(confirmation(
            "subscribe",
            Some(&channel),
            ctx.session.subscription_count(),
        ));
    }
    Ok(Reply::Many(frames))
}

fn unsubscribe(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let targets: Vec<String> = if args.is_empty() {
        ctx.session.channels.iter().cloned().collect()
    } else {
        (0..args.len())
            .map(|i| arg_string(args, i))
            .collect::<Result<_, _>>()?
    };

    // unsubscribing from nothing still gets one confirmation
    if targets.is_empty() {
        return Ok(Reply::One(confirmation("unsubscribe", None, 0)));
    }

    let mut frames = Vec::with_capacity(targets.len());
    for channel in targets {
        if ctx.session.channels.remove(&channel) {
            ctx.shared.pubsub.unsubscribe(&channel, ctx.session.id);
        }
        frames.push(confirmation(
            "unsubscribe",
            Some(&channel),
            ctx.session.subscription_count(),
        ));
    }
    Ok(Reply::Many(frames))
}

fn psubscribe(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let mut frames = Vec::with_capacity(args.len());
    for i in 0..args.len() {
        let pattern = arg_string(args, i)?;
        if !ctx.session.patterns.contains(&pattern) {
            if !ctx.shared.pubsub.psubscribe(
                &pattern,
                ctx.session.id,
                ctx.session.push_tx.clone(),
            ) {
                return Err(ErrorReply::msg("ERR pattern is too long"));
            }
            ctx.session.patterns.insert(pattern.clone());
        }
        frames.push(confirmation(
            "psubscribe",
            Some(&pattern),
            ctx.session.subscription_count(),
        ));
    }
    Ok(Reply::Many(frames))
}

fn punsubscribe(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let targets: Vec<String> = if args.is_empty() {
        ctx.session.patterns.iter().cloned().collect()
    } else {
        (0..args.len())
            .map(|i| arg_string(args, i))
            .collect::<Result<_, _>>()?
    };

    if targets.is_empty() {
        return Ok(Reply::One(confirmation("punsubscribe", None, 0)));
    }

    let mut frames = Vec::with_capacity(targets.len());
    for pattern in targets {
        if ctx.session.patterns.remove(&pattern) {
            ctx.shared.pubsub.punsubscribe(&pattern, ctx.session.id);
        }
        frames.push(confirmation(
            "punsubscribe",
            Some(&pattern),
            ctx.session.subscription_count(),
        ));
    }
    Ok(Reply::Many(frames))
}

fn publish(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let channel = arg_str(args, 0)?;
    let receivers = ctx.shared.pubsub.publish(channel, &args[1]);
    int(receivers as i64)
}

fn pubsub(ctx: &mut Ctx<'_>, args: &[Bytes]) -> Result<Reply, ErrorReply> {
    let sub = arg_str(args, 0)?.to_ascii_uppercase();
    match sub.as_str() {
        "CHANNELS" => {
            let pattern = if args.len() > 1 {
                Some(arg_str(args, 1)?)
            } else {
                None
            };
            let names = ctx.shared.pubsub.channel_names(pattern);
            array(names.into_iter().map(Frame::bulk).collect())
        }
        "NUMSUB" => {
            let channels: Vec<String> = (1..args.len())
                .map(|i| arg_string(args, i))
                .collect::<Result<_, _>>()?;
            let counts = ctx.shared.pubsub.numsub(&channels);
            let mut out = Vec::with_capacity(counts.len() * 2);
            for (channel, count) in counts {
                out.push(Frame::bulk(channel));
                out.push(Frame::Integer(count as i64));
            }
            array(out)
        }
        "NUMPAT" => int(ctx.shared.pubsub.numpat() as i64),
        other => Err(ErrorReply::msg(format!(
            "ERR Unknown PUBSUB subcommand or wrong number of arguments for '{other}'"
        ))),
    }
}
