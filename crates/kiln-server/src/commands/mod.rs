//! Command dispatch: the registry and shared handler plumbing.
//!
//! Every command is a [`CommandSpec`] — name, Redis-style arity
//! (negative = at-least), flags, and a handler function. The registry
//! maps uppercase names to specs; [`execute`] validates arity, runs
//! the handler, and folds handler errors into RESP error replies.
//!
//! Handlers run with the keyspace lock held (the caller acquires it
//! and builds the [`Ctx`]), so a handler is atomic by construction and
//! must never block on I/O.

pub mod hash;
pub mod keys;
pub mod list;
pub mod pubsub;
pub mod server;
pub mod set;
pub mod string;
pub mod txn;
pub mod zset;

use ahash::AHashMap;
use bytes::Bytes;

use kiln_core::{FloatError, IntError, ListSetError, RenameError, Store, WrongType};
use kiln_protocol::Frame;

use crate::server::Shared;
use crate::session::Session;

/// Command mutates the keyspace; successful runs bump the dirty
/// counter that drives background snapshots.
pub const WRITE: u32 = 1 << 0;
/// Command only reads the keyspace.
pub const READONLY: u32 = 1 << 1;
/// Server administration command.
pub const ADMIN: u32 = 1 << 2;
/// Allowed while the session is in subscribe mode.
pub const PUBSUB: u32 = 1 << 3;
/// Command does not operate on the selected database.
pub const NO_DB_SELECT: u32 = 1 << 4;
/// Transaction control; never queued by MULTI.
pub const TXN: u32 = 1 << 5;

/// A registered command.
pub struct CommandSpec {
    /// Uppercase command name.
    pub name: &'static str,
    /// Redis arity: total token count including the name; negative
    /// means "at least |arity|".
    pub arity: i32,
    /// Bitwise OR of the flag constants above.
    pub flags: u32,
    pub handler: Handler,
}

/// Handler signature. `args` excludes the command name. An `Err`
/// frame becomes the error reply.
pub type Handler = fn(&mut Ctx<'_>, &[Bytes]) -> Result<Reply, ErrorReply>;

/// What a handler hands back to the connection.
pub enum Reply {
    /// The common case: one frame.
    One(Frame),
    /// Multiple frames written back to back (subscribe confirmations).
    Many(Vec<Frame>),
}

/// An error reply. Wraps the RESP error frame in a crate-local type so
/// keyspace errors can flow through `?` in handlers.
#[derive(Debug)]
pub struct ErrorReply(pub Frame);

impl ErrorReply {
    /// An error reply from a pre-formatted message (category prefix
    /// included).
    pub fn msg(msg: impl Into<String>) -> Self {
        ErrorReply(Frame::Error(msg.into()))
    }
}

impl From<WrongType> for ErrorReply {
    fn from(e: WrongType) -> Self {
        ErrorReply::msg(e.to_string())
    }
}

impl From<IntError> for ErrorReply {
    fn from(e: IntError) -> Self {
        ErrorReply::msg(e.to_string())
    }
}

impl From<FloatError> for ErrorReply {
    fn from(e: FloatError) -> Self {
        ErrorReply::msg(e.to_string())
    }
}

impl From<RenameError> for ErrorReply {
    fn from(e: RenameError) -> Self {
        ErrorReply::msg(e.to_string())
    }
}

impl From<ListSetError> for ErrorReply {
    fn from(e: ListSetError) -> Self {
        ErrorReply::msg(e.to_string())
    }
}

/// Execution context: the locked store plus session and process state.
pub struct Ctx<'a> {
    pub store: &'a mut Store,
    pub session: &'a mut Session,
    pub shared: &'a std::sync::Arc<Shared>,
}

impl Ctx<'_> {
    /// The session's currently selected database.
    pub fn db(&mut self) -> &mut kiln_core::Db {
        self.store.db(self.session.db_index)
    }
}

/// Name → spec table, built once at startup.
pub struct Registry {
    map: AHashMap<&'static str, CommandSpec>,
}

impl Registry {
    pub fn new() -> Self {
        let mut map = AHashMap::new();
        for spec in string::specs()
            .into_iter()
            .chain(list::specs())
            .chain(set::specs())
            .chain(hash::specs())
            .chain(zset::specs())
            .chain(keys::specs())
            .chain(server::specs())
            .chain(pubsub::specs())
            .chain(txn::specs())
        {
            map.insert(spec.name, spec);
        }
        Self { map }
    }

    /// Looks up a spec by uppercase name.
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.map.get(name)
    }

    /// All registered names, for COMMAND introspection.
    pub fn names(&self) -> Vec<&'static str> {
        self.map.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Looks up and runs one command under the caller's lock. Arity and
/// existence failures become error replies, not connection errors.
pub fn execute(ctx: &mut Ctx<'_>, name: &str, args: &[Bytes]) -> Reply {
    let Some(spec) = ctx.shared.registry.get(name) else {
        return Reply::One(unknown_command(name).0);
    };
    if !arity_ok(spec.arity, args.len() + 1) {
        return Reply::One(wrong_args(name).0);
    }

    match (spec.handler)(ctx, args) {
        Ok(reply) => {
            if spec.flags & WRITE != 0 {
                ctx.store.mark_dirty(1);
            }
            reply
        }
        Err(err) => Reply::One(err.0),
    }
}

/// Validates a token count against a Redis-style arity.
pub fn arity_ok(arity: i32, argc: usize) -> bool {
    if arity >= 0 {
        argc == arity as usize
    } else {
        argc >= (-arity) as usize
    }
}

// ---------------------------------------------------------------------------
// reply constructors
// ---------------------------------------------------------------------------

pub fn ok() -> Result<Reply, ErrorReply> {
    Ok(Reply::One(Frame::ok()))
}

pub fn simple(s: impl Into<String>) -> Result<Reply, ErrorReply> {
    Ok(Reply::One(Frame::Simple(s.into())))
}

pub fn int(n: i64) -> Result<Reply, ErrorReply> {
    Ok(Reply::One(Frame::Integer(n)))
}

pub fn bulk(data: impl Into<Bytes>) -> Result<Reply, ErrorReply> {
    Ok(Reply::One(Frame::Bulk(data.into())))
}

pub fn nil() -> Result<Reply, ErrorReply> {
    Ok(Reply::One(Frame::NullBulk))
}

pub fn nil_array() -> Result<Reply, ErrorReply> {
    Ok(Reply::One(Frame::NullArray))
}

pub fn array(frames: Vec<Frame>) -> Result<Reply, ErrorReply> {
    Ok(Reply::One(Frame::Array(frames)))
}

/// An optional bulk reply: nil when absent.
pub fn opt_bulk(data: Option<impl Into<Bytes>>) -> Result<Reply, ErrorReply> {
    match data {
        Some(d) => bulk(d),
        None => nil(),
    }
}

// ---------------------------------------------------------------------------
// error constructors
// ---------------------------------------------------------------------------

pub fn unknown_command(name: &str) -> ErrorReply {
    ErrorReply::msg(format!(
        "ERR unknown command '{}'",
        name.to_ascii_lowercase()
    ))
}

pub fn wrong_args(name: &str) -> ErrorReply {
    ErrorReply::msg(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

pub fn syntax_error() -> ErrorReply {
    ErrorReply::msg("ERR syntax error")
}

pub fn not_an_integer() -> ErrorReply {
    ErrorReply::msg("ERR value is not an integer or out of range")
}

pub fn not_a_float() -> ErrorReply {
    ErrorReply::msg("ERR value is not a valid float")
}

// ---------------------------------------------------------------------------
// argument extractors
// ---------------------------------------------------------------------------

/// Extracts a UTF-8 string argument.
pub fn arg_str(args: &[Bytes], index: usize) -> Result<&str, ErrorReply> {
    let raw = args
        .get(index)
        .ok_or_else(|| ErrorReply::msg("ERR missing argument"))?;
    std::str::from_utf8(raw).map_err(|_| ErrorReply::msg("ERR invalid argument encoding"))
}

/// Extracts an owned UTF-8 string argument.
pub fn arg_string(args: &[Bytes], index: usize) -> Result<String, ErrorReply> {
    arg_str(args, index).map(str::to_owned)
}

/// Extracts an i64 argument.
pub fn arg_i64(args: &[Bytes], index: usize) -> Result<i64, ErrorReply> {
    arg_str(args, index)?
        .parse()
        .map_err(|_| not_an_integer())
}

/// Extracts a usize argument (rejects negatives).
pub fn arg_usize(args: &[Bytes], index: usize) -> Result<usize, ErrorReply> {
    arg_str(args, index)?
        .parse()
        .map_err(|_| not_an_integer())
}

/// Extracts an f64 argument, rejecting NaN.
pub fn arg_f64(args: &[Bytes], index: usize) -> Result<f64, ErrorReply> {
    let v: f64 = arg_str(args, index)?.parse().map_err(|_| not_a_float())?;
    if v.is_nan() {
        return Err(not_a_float());
    }
    Ok(v)
}

/// Extracts a timeout argument for the B-variant probes: validated as
/// a non-negative number, then ignored.
pub fn arg_timeout(args: &[Bytes], index: usize) -> Result<(), ErrorReply> {
    let v: f64 = arg_str(args, index)?
        .parse()
        .map_err(|_| ErrorReply::msg("ERR timeout is not a float or out of range"))?;
    if v < 0.0 || v.is_nan() {
        return Err(ErrorReply::msg("ERR timeout is negative"));
    }
    Ok(())
}

/// Milliseconds since the Unix epoch, for EXPIREAT-style conversions
/// to the process-monotonic expiry clock.
pub fn unix_now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Parses trailing `[MATCH pattern] [COUNT n]` options shared by the
/// SCAN family.
pub fn parse_scan_opts(args: &[Bytes]) -> Result<(Option<String>, usize), ErrorReply> {
    let mut pattern = None;
    let mut count = 10usize;

    let mut i = 0;
    while i < args.len() {
        match arg_str(args, i)?.to_ascii_uppercase().as_str() {
            "MATCH" if i + 1 < args.len() => {
                pattern = Some(arg_string(args, i + 1)?);
                i += 2;
            }
            "COUNT" if i + 1 < args.len() => {
                count = arg_usize(args, i + 1)?;
                if count == 0 {
                    return Err(syntax_error());
                }
                i += 2;
            }
            _ => return Err(syntax_error()),
        }
    }
    Ok((pattern, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_exact() {
        assert!(arity_ok(2, 2));
        assert!(!arity_ok(2, 1));
        assert!(!arity_ok(2, 3));
    }

    #[test]
    fn arity_minimum() {
        assert!(arity_ok(-3, 3));
        assert!(arity_ok(-3, 10));
        assert!(!arity_ok(-3, 2));
    }

    #[test]
    fn registry_has_expected_commands() {
        let registry = Registry::new();
        for name in [
            "GET", "SET", "DEL", "LPUSH", "SADD", "HSET", "ZADD", "EXPIRE", "SCAN", "PING",
            "SUBSCRIBE", "PUBLISH", "MULTI", "EXEC", "DISCARD", "SAVE", "BGSAVE", "SHUTDOWN",
        ] {
            assert!(registry.get(name).is_some(), "missing command {name}");
        }
        assert!(registry.get("NOPE").is_none());
        // the full surface: every original command plus pub/sub,
        // transactions, and snapshot triggers
        assert!(registry.len() >= 135, "registry has {}", registry.len());
    }

    #[test]
    fn write_flags_are_set_on_mutators() {
        let registry = Registry::new();
        for name in ["SET", "DEL", "LPUSH", "SADD", "HSET", "ZADD", "FLUSHDB"] {
            let spec = registry.get(name).unwrap();
            assert!(spec.flags & WRITE != 0, "{name} should be a write command");
        }
        for name in ["GET", "KEYS", "TTL", "STRLEN"] {
            let spec = registry.get(name).unwrap();
            assert!(spec.flags & WRITE == 0, "{name} should not be a write command");
        }
    }

    #[test]
    fn scan_opts_parsing() {
        let args = |parts: &[&str]| -> Vec<Bytes> {
            parts.iter().map(|s| Bytes::from(s.to_string())).collect()
        };

        assert_eq!(parse_scan_opts(&args(&[])).unwrap(), (None, 10));
        assert_eq!(
            parse_scan_opts(&args(&["MATCH", "a*"])).unwrap(),
            (Some("a*".to_string()), 10)
        );
        assert_eq!(
            parse_scan_opts(&args(&["count", "25", "match", "x"])).unwrap(),
            (Some("x".to_string()), 25)
        );
        assert!(parse_scan_opts(&args(&["BOGUS"])).is_err());
        assert!(parse_scan_opts(&args(&["COUNT", "0"])).is_err());
    }
}
