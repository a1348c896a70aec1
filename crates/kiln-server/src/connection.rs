//! Per-connection handler.
//!
//! Reads RESP frames from the socket, routes them through the dispatch
//! registry, and writes replies back. Multiple complete frames in one
//! read are processed as a pipeline with a single batched write.
//! Between requests the task also drains the session's pub/sub push
//! queue, which is how `message`/`pmessage` frames interleave with
//! replies.
//!
//! State machine per spec: reading → executing → writing → reading,
//! with subscribe-mode gating and MULTI queuing layered on top.
//! Protocol errors send one error reply and close; handler errors are
//! ordinary replies.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use kiln_protocol::{parse_frame, Frame, ProtocolError};

use crate::commands::{self, Ctx, Reply, PUBSUB, TXN};
use crate::server::Shared;
use crate::session::Session;

/// Initial read buffer capacity; covers typical commands without
/// reallocating.
const BUF_CAPACITY: usize = 4096;

/// Maximum read buffer size before the client is disconnected. Caps
/// what a slow or malicious client can pin with incomplete frames.
const MAX_BUF_SIZE: usize = 64 * 1024 * 1024;

/// Drives one client connection to completion.
pub async fn handle(
    stream: TcpStream,
    shared: &Arc<Shared>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let id = shared.next_session_id.fetch_add(1, Ordering::Relaxed);
    let mut session = Session::new(id, push_tx);

    let result = drive(stream, shared, &mut session, push_rx).await;

    // disconnect cleanup: subscriptions die with the session, queued
    // transactions are dropped
    let channels: Vec<String> = session.channels.drain().collect();
    let patterns: Vec<String> = session.patterns.drain().collect();
    shared.pubsub.remove_session(id, channels, patterns);
    session.reset_multi();

    result
}

async fn drive(
    mut stream: TcpStream,
    shared: &Arc<Shared>,
    session: &mut Session,
    mut push_rx: mpsc::UnboundedReceiver<Bytes>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = BytesMut::with_capacity(BUF_CAPACITY);
    let mut out = BytesMut::with_capacity(BUF_CAPACITY);
    let mut shutdown_rx = shared.shutdown.subscribe();

    // split so the pending read future and the write calls in branch
    // bodies don't fight over one &mut stream
    let (mut reader, mut writer) = stream.split();

    loop {
        tokio::select! {
            read = reader.read_buf(&mut buf) => {
                match read {
                    Ok(0) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => {
                        // I/O errors close the connection silently
                        debug!("read error: {e}");
                        return Ok(());
                    }
                }

                if buf.len() > MAX_BUF_SIZE {
                    out.clear();
                    Frame::Error("ERR Protocol error: request exceeds buffer limit".into())
                        .serialize(&mut out);
                    let _ = writer.write_all(&out).await;
                    return Ok(());
                }

                // drain every complete frame (pipelining), batching the
                // replies into one write
                out.clear();
                loop {
                    match parse_frame(&buf) {
                        Ok(Some((frame, consumed))) => {
                            buf.advance(consumed);
                            if let Err(violation) = process(shared, session, frame, &mut out) {
                                Frame::Error(format!("ERR Protocol error: {violation}"))
                                    .serialize(&mut out);
                                let _ = writer.write_all(&out).await;
                                return Ok(());
                            }
                            if session.should_close {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            Frame::Error(format!("ERR Protocol error: {e}")).serialize(&mut out);
                            let _ = writer.write_all(&out).await;
                            return Ok(());
                        }
                    }
                }

                if !out.is_empty() {
                    writer.write_all(&out).await?;
                }
                if session.should_close {
                    return Ok(());
                }
            }

            Some(push) = push_rx.recv() => {
                // pub/sub frames enqueued by publishers; written from
                // this task only, so replies never interleave mid-frame
                writer.write_all(&push).await?;
            }

            _ = shutdown_rx.changed() => {
                return Ok(());
            }
        }
    }
}

/// Handles one parsed request frame: extracts the command tokens,
/// applies subscribe-mode and transaction gating, dispatches, and
/// serializes the reply into `out`.
///
/// `Err` means a protocol violation that must close the connection.
fn process(
    shared: &Arc<Shared>,
    session: &mut Session,
    frame: Frame,
    out: &mut BytesMut,
) -> Result<(), ProtocolError> {
    let tokens = match frame {
        Frame::Array(items) => {
            let mut tokens = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Frame::Bulk(data) => tokens.push(data),
                    Frame::Simple(s) => tokens.push(Bytes::from(s)),
                    _ => return Err(ProtocolError::InvalidUtf8("request element")),
                }
            }
            tokens
        }
        // blank inline lines parse to empty arrays and are ignored
        _ => return Err(ProtocolError::InvalidUtf8("request")),
    };

    let Some((name_raw, args)) = tokens.split_first() else {
        return Ok(());
    };
    let name = String::from_utf8_lossy(name_raw).to_ascii_uppercase();
    let flags = shared
        .registry
        .get(&name)
        .map(|spec| spec.flags)
        .unwrap_or(0);

    // subscribe mode allows only the pub/sub subset
    if session.in_subscribe_mode() && flags & PUBSUB == 0 {
        let reply = Frame::Error(format!(
            "ERR Can't execute '{}': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context",
            name.to_ascii_lowercase()
        ));
        reply.serialize(out);
        return Ok(());
    }

    // MULTI queues everything except transaction control and QUIT
    if session.in_multi && flags & TXN == 0 && name != "QUIT" {
        queue_command(shared, session, &name, tokens.clone(), out);
        return Ok(());
    }

    let reply = {
        let mut store = shared.lock_store();
        let mut ctx = Ctx {
            store: &mut store,
            session,
            shared,
        };
        commands::execute(&mut ctx, &name, args)
    };
    shared.commands_processed.fetch_add(1, Ordering::Relaxed);

    match reply {
        Reply::One(frame) => frame.serialize(out),
        Reply::Many(frames) => {
            for frame in frames {
                frame.serialize(out);
            }
        }
    }
    Ok(())
}

/// Validates a command at queue time and appends it to the session's
/// transaction queue. Validation failures poison the transaction so
/// EXEC aborts.
fn queue_command(
    shared: &Arc<Shared>,
    session: &mut Session,
    name: &str,
    tokens: Vec<Bytes>,
    out: &mut BytesMut,
) {
    let reply = match shared.registry.get(name) {
        None => {
            session.multi_error = true;
            commands::unknown_command(name).0
        }
        Some(spec) if spec.flags & PUBSUB != 0 => {
            session.multi_error = true;
            Frame::Error(format!(
                "ERR {} is not allowed in transactions",
                name.to_ascii_lowercase()
            ))
        }
        Some(spec) if !commands::arity_ok(spec.arity, tokens.len()) => {
            session.multi_error = true;
            commands::wrong_args(name).0
        }
        Some(_) => {
            session.queue.push(tokens);
            Frame::Simple("QUEUED".into())
        }
    };
    reply.serialize(out);
}
