//! Transaction control handlers: MULTI, EXEC, DISCARD.
//!
//! MULTI flips the session into queuing mode; the connection layer
//! intercepts subsequent commands and queues them instead of calling
//! the dispatcher. EXEC replays the queue under the single lock
//! acquisition the dispatcher already made, so the whole transaction
//! is atomic with respect to every other client.

use bytes::Bytes;

use super::ErrorReply;
use super::{array, ok, Ctx, CommandSpec, Reply, TXN};

pub fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec { name: "MULTI", arity: 1, flags: TXN, handler: multi },
        CommandSpec { name: "EXEC", arity: 1, flags: TXN, handler: exec },
        CommandSpec { name: "DISCARD", arity: 1, flags: TXN, handler: discard },
    ]
}

fn multi(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    if ctx.session.in_multi {
        return Err(ErrorReply::msg("ERR MULTI calls can not be nested"));
    }
    ctx.session.in_multi = true;
    ok()
}

fn exec(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    if !ctx.session.in_multi {
        return Err(ErrorReply::msg("ERR EXEC without MULTI"));
    }
    if ctx.session.multi_error {
        ctx.session.reset_multi();
        return Err(ErrorReply::msg(
            "EXECABORT Transaction discarded because of previous errors.",
        ));
    }

    let queue = std::mem::take(&mut ctx.session.queue);
    ctx.session.reset_multi();

    // replay under the lock acquisition the dispatcher already holds;
    // runtime errors land in the reply array without aborting the rest
    let mut replies = Vec::with_capacity(queue.len());
    for tokens in queue {
        let name = String::from_utf8_lossy(&tokens[0]).to_ascii_uppercase();
        match super::execute(ctx, &name, &tokens[1..]) {
            Reply::One(frame) => replies.push(frame),
            Reply::Many(frames) => replies.extend(frames),
        }
    }
    array(replies)
}

fn discard(ctx: &mut Ctx<'_>, _args: &[Bytes]) -> Result<Reply, ErrorReply> {
    if !ctx.session.in_multi {
        return Err(ErrorReply::msg("ERR DISCARD without MULTI"));
    }
    ctx.session.reset_multi();
    ok()
}
