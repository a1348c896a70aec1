//! End-to-end tests: a real server task, real TCP sockets, RESP on
//! the wire.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use kiln_protocol::{parse_frame, Frame};
use kiln_server::server::{serve, Shared};
use kiln_server::Config;

/// An in-process server on an ephemeral port.
struct TestServer {
    addr: std::net::SocketAddr,
    shared: Arc<Shared>,
    task: tokio::task::JoinHandle<()>,
    _dir: Option<tempfile::TempDir>,
}

impl TestServer {
    /// Starts a server with a throwaway snapshot path.
    async fn start() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let dbfilename = dir.path().join("dump.rdb");
        Self::start_with_dbfile(dbfilename, Some(dir)).await
    }

    /// Starts a server against a caller-managed snapshot path, so a
    /// second instance can restore from it.
    async fn start_with_dbfile(
        dbfilename: std::path::PathBuf,
        dir: Option<tempfile::TempDir>,
    ) -> Self {
        let config = Config {
            dbfilename: dbfilename.clone(),
            ..Config::default()
        };
        let store = kiln_server::snapshotter::load(&dbfilename, config.databases);
        let shared = Shared::new(config, store);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let task_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            let _ = serve(task_shared, listener).await;
        });

        Self {
            addr,
            shared,
            task,
            _dir: dir,
        }
    }

    async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Signals shutdown and waits for the accept loop to finish its
    /// final snapshot.
    async fn shutdown(self) -> Option<tempfile::TempDir> {
        let _ = self.shared.shutdown.send(true);
        let _ = self.task.await;
        self._dir
    }
}

/// A minimal RESP client for integration testing.
struct TestClient {
    stream: TcpStream,
    buf: BytesMut,
}

impl TestClient {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .unwrap_or_else(|e| panic!("failed to connect to {addr}: {e}"));
        Self {
            stream,
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Sends a command and returns the parsed response frame.
    async fn cmd(&mut self, args: &[&str]) -> Frame {
        let parts: Vec<Frame> = args
            .iter()
            .map(|a| Frame::Bulk(Bytes::copy_from_slice(a.as_bytes())))
            .collect();
        let frame = Frame::Array(parts);

        let mut out = BytesMut::new();
        frame.serialize(&mut out);
        self.stream.write_all(&out).await.unwrap();

        self.read_frame().await
    }

    /// Reads the next frame without sending anything. Pub/sub pushes
    /// arrive this way.
    async fn read_frame(&mut self) -> Frame {
        loop {
            match parse_frame(&self.buf) {
                Ok(Some((frame, consumed))) => {
                    let _ = self.buf.split_to(consumed);
                    return frame;
                }
                Ok(None) => {
                    let n = self.stream.read_buf(&mut self.buf).await.unwrap();
                    if n == 0 {
                        panic!("server closed connection while waiting for frame");
                    }
                }
                Err(e) => panic!("protocol error: {e}"),
            }
        }
    }

    async fn get_bulk(&mut self, args: &[&str]) -> Option<String> {
        match self.cmd(args).await {
            Frame::Bulk(data) => Some(String::from_utf8_lossy(&data).to_string()),
            Frame::NullBulk => None,
            other => panic!("expected Bulk or NullBulk, got {other:?}"),
        }
    }

    async fn get_int(&mut self, args: &[&str]) -> i64 {
        match self.cmd(args).await {
            Frame::Integer(n) => n,
            other => panic!("expected Integer, got {other:?}"),
        }
    }

    async fn ok(&mut self, args: &[&str]) {
        match self.cmd(args).await {
            Frame::Simple(s) if s == "OK" => {}
            other => panic!("expected OK, got {other:?}"),
        }
    }

    async fn err(&mut self, args: &[&str]) -> String {
        match self.cmd(args).await {
            Frame::Error(msg) => msg,
            other => panic!("expected Error, got {other:?}"),
        }
    }

    /// Sends a command and collects the reply array as strings.
    async fn get_array(&mut self, args: &[&str]) -> Vec<String> {
        match self.cmd(args).await {
            Frame::Array(frames) => frames
                .into_iter()
                .map(|f| match f {
                    Frame::Bulk(data) => String::from_utf8_lossy(&data).to_string(),
                    Frame::Integer(n) => n.to_string(),
                    Frame::Simple(s) => s,
                    other => panic!("unexpected array element {other:?}"),
                })
                .collect(),
            other => panic!("expected Array, got {other:?}"),
        }
    }
}

fn bulk_eq(frame: &Frame, expected: &str) -> bool {
    matches!(frame, Frame::Bulk(b) if b.as_ref() == expected.as_bytes())
}

// -- literal scenarios from the contract --

#[tokio::test]
async fn strings_set_get_strlen() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["SET", "foo", "bar"]).await;
    assert_eq!(c.get_bulk(&["GET", "foo"]).await.as_deref(), Some("bar"));
    assert_eq!(c.get_int(&["STRLEN", "foo"]).await, 3);
}

#[tokio::test]
async fn lists_push_range_pop_len() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    assert_eq!(c.get_int(&["LPUSH", "L", "a", "b", "c"]).await, 3);
    assert_eq!(c.get_array(&["LRANGE", "L", "0", "-1"]).await, ["c", "b", "a"]);
    assert_eq!(c.get_bulk(&["RPOP", "L"]).await.as_deref(), Some("a"));
    assert_eq!(c.get_int(&["LLEN", "L"]).await, 2);
}

#[tokio::test]
async fn zset_scenario() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    assert_eq!(c.get_int(&["ZADD", "Z", "1", "a", "2", "b", "3", "c"]).await, 3);
    assert_eq!(
        c.get_array(&["ZRANGEBYSCORE", "Z", "2", "3", "WITHSCORES"]).await,
        ["b", "2", "c", "3"]
    );
    assert_eq!(c.get_bulk(&["ZINCRBY", "Z", "10", "a"]).await.as_deref(), Some("11"));
    assert_eq!(c.get_array(&["ZRANGE", "Z", "0", "-1"]).await, ["b", "c", "a"]);
}

#[tokio::test]
async fn expiry_hides_key() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["SET", "k", "v", "EX", "1"]).await;
    assert_eq!(c.get_bulk(&["GET", "k"]).await.as_deref(), Some("v"));

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(c.get_bulk(&["GET", "k"]).await, None);
    assert_eq!(c.get_int(&["EXISTS", "k"]).await, 0);
}

#[tokio::test]
async fn hash_scenario() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    assert_eq!(
        c.get_int(&["HSET", "u", "name", "John", "age", "30"]).await,
        2
    );
    assert_eq!(c.get_int(&["HINCRBY", "u", "age", "1"]).await, 31);

    let flat = c.get_array(&["HGETALL", "u"]).await;
    assert_eq!(flat.len(), 4);
    let pairs: std::collections::HashMap<_, _> = flat
        .chunks(2)
        .map(|p| (p[0].clone(), p[1].clone()))
        .collect();
    assert_eq!(pairs["name"], "John");
    assert_eq!(pairs["age"], "31");
}

#[tokio::test]
async fn pubsub_fanout() {
    let server = TestServer::start().await;
    let mut sub = server.connect().await;
    let mut publisher = server.connect().await;

    let confirmation = sub.cmd(&["SUBSCRIBE", "ch"]).await;
    match confirmation {
        Frame::Array(ref frames) => {
            assert!(bulk_eq(&frames[0], "subscribe"));
            assert!(bulk_eq(&frames[1], "ch"));
            assert_eq!(frames[2], Frame::Integer(1));
        }
        other => panic!("expected subscribe confirmation, got {other:?}"),
    }

    assert_eq!(publisher.get_int(&["PUBLISH", "ch", "hello"]).await, 1);

    let msg = sub.read_frame().await;
    match msg {
        Frame::Array(ref frames) => {
            assert!(bulk_eq(&frames[0], "message"));
            assert!(bulk_eq(&frames[1], "ch"));
            assert!(bulk_eq(&frames[2], "hello"));
        }
        other => panic!("expected message frame, got {other:?}"),
    }
}

// -- broader behavior --

#[tokio::test]
async fn pattern_subscription_gets_pmessage() {
    let server = TestServer::start().await;
    let mut sub = server.connect().await;
    let mut publisher = server.connect().await;

    sub.cmd(&["PSUBSCRIBE", "user:*"]).await;
    assert_eq!(
        publisher.get_int(&["PUBLISH", "user:login", "alice"]).await,
        1
    );

    let msg = sub.read_frame().await;
    match msg {
        Frame::Array(ref frames) => {
            assert_eq!(frames.len(), 4);
            assert!(bulk_eq(&frames[0], "pmessage"));
            assert!(bulk_eq(&frames[1], "user:*"));
            assert!(bulk_eq(&frames[2], "user:login"));
            assert!(bulk_eq(&frames[3], "alice"));
        }
        other => panic!("expected pmessage frame, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribe_mode_restricts_commands() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.cmd(&["SUBSCRIBE", "ch"]).await;
    let err = c.err(&["GET", "k"]).await;
    assert!(err.contains("only"), "unexpected error: {err}");

    // PING still works
    assert_eq!(c.cmd(&["PING"]).await, Frame::Simple("PONG".into()));

    // after unsubscribing, normal commands work again
    c.cmd(&["UNSUBSCRIBE"]).await;
    assert_eq!(c.get_bulk(&["GET", "k"]).await, None);
}

#[tokio::test]
async fn publish_counts_receivers() {
    let server = TestServer::start().await;
    let mut sub1 = server.connect().await;
    let mut sub2 = server.connect().await;
    let mut publisher = server.connect().await;

    assert_eq!(publisher.get_int(&["PUBLISH", "ch", "x"]).await, 0);

    sub1.cmd(&["SUBSCRIBE", "ch"]).await;
    sub2.cmd(&["SUBSCRIBE", "ch"]).await;

    assert_eq!(publisher.get_int(&["PUBLISH", "ch", "x"]).await, 2);
}

#[tokio::test]
async fn multi_exec_applies_queue_atomically() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["MULTI"]).await;
    assert_eq!(c.cmd(&["INCR", "x"]).await, Frame::Simple("QUEUED".into()));
    assert_eq!(c.cmd(&["INCR", "x"]).await, Frame::Simple("QUEUED".into()));

    match c.cmd(&["EXEC"]).await {
        Frame::Array(frames) => {
            assert_eq!(frames, vec![Frame::Integer(1), Frame::Integer(2)]);
        }
        other => panic!("expected EXEC array, got {other:?}"),
    }

    assert_eq!(c.get_bulk(&["GET", "x"]).await.as_deref(), Some("2"));
}

#[tokio::test]
async fn multi_discard_drops_queue() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["MULTI"]).await;
    c.cmd(&["SET", "k", "v"]).await;
    c.ok(&["DISCARD"]).await;

    assert_eq!(c.get_int(&["EXISTS", "k"]).await, 0);
    let err = c.err(&["EXEC"]).await;
    assert!(err.contains("without MULTI"), "unexpected error: {err}");
}

#[tokio::test]
async fn queue_error_aborts_exec() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["MULTI"]).await;
    c.cmd(&["SET", "k", "v"]).await;
    // unknown command poisons the transaction
    let err = c.err(&["NOSUCHCMD"]).await;
    assert!(err.contains("unknown command"), "unexpected error: {err}");

    let err = c.err(&["EXEC"]).await;
    assert!(err.starts_with("EXECABORT"), "unexpected error: {err}");
    assert_eq!(c.get_int(&["EXISTS", "k"]).await, 0);
}

#[tokio::test]
async fn runtime_errors_inside_exec_do_not_abort() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["SET", "s", "text"]).await;
    c.ok(&["MULTI"]).await;
    c.cmd(&["INCR", "s"]).await; // queues fine, fails at run time
    c.cmd(&["SET", "after", "1"]).await;

    match c.cmd(&["EXEC"]).await {
        Frame::Array(frames) => {
            assert!(matches!(&frames[0], Frame::Error(_)));
            assert_eq!(frames[1], Frame::Simple("OK".into()));
        }
        other => panic!("expected EXEC array, got {other:?}"),
    }
    assert_eq!(c.get_bulk(&["GET", "after"]).await.as_deref(), Some("1"));
}

#[tokio::test]
async fn concurrent_incr_is_atomic() {
    let server = TestServer::start().await;

    const CLIENTS: usize = 8;
    const INCRS: usize = 50;

    let mut tasks = Vec::new();
    for _ in 0..CLIENTS {
        let mut c = server.connect().await;
        tasks.push(tokio::spawn(async move {
            for _ in 0..INCRS {
                c.get_int(&["INCR", "counter"]).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut c = server.connect().await;
    assert_eq!(
        c.get_bulk(&["GET", "counter"]).await.as_deref(),
        Some((CLIENTS * INCRS).to_string().as_str())
    );
}

#[tokio::test]
async fn idempotence_contracts() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["SET", "k", "v"]).await;
    c.ok(&["SET", "k", "v"]).await;
    assert_eq!(c.get_bulk(&["GET", "k"]).await.as_deref(), Some("v"));

    assert_eq!(c.get_int(&["DEL", "k"]).await, 1);
    assert_eq!(c.get_int(&["DEL", "k"]).await, 0);

    assert_eq!(c.get_int(&["SADD", "s", "m"]).await, 1);
    assert_eq!(c.get_int(&["SADD", "s", "m"]).await, 0);
}

#[tokio::test]
async fn rename_moves_value_and_ttl() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["SET", "old", "v", "EX", "100"]).await;
    c.ok(&["RENAME", "old", "new"]).await;

    assert_eq!(c.get_int(&["EXISTS", "old"]).await, 0);
    assert_eq!(c.get_bulk(&["GET", "new"]).await.as_deref(), Some("v"));
    let ttl = c.get_int(&["TTL", "new"]).await;
    assert!((1..=100).contains(&ttl), "ttl was {ttl}");
}

#[tokio::test]
async fn select_isolates_databases() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["SET", "k", "db0"]).await;
    c.ok(&["SELECT", "1"]).await;
    assert_eq!(c.get_bulk(&["GET", "k"]).await, None);
    c.ok(&["SET", "k", "db1"]).await;

    // FLUSHDB only clears the selected database
    c.ok(&["FLUSHDB"]).await;
    assert_eq!(c.get_int(&["DBSIZE"]).await, 0);
    c.ok(&["SELECT", "0"]).await;
    assert_eq!(c.get_bulk(&["GET", "k"]).await.as_deref(), Some("db0"));

    let err = c.err(&["SELECT", "99"]).await;
    assert!(err.contains("out of range"), "unexpected error: {err}");
}

#[tokio::test]
async fn wrong_type_and_unknown_command_errors() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["SET", "s", "v"]).await;
    let err = c.err(&["LPUSH", "s", "x"]).await;
    assert!(err.starts_with("WRONGTYPE"), "unexpected error: {err}");

    let err = c.err(&["BOGUS"]).await;
    assert!(err.contains("unknown command"), "unexpected error: {err}");

    let err = c.err(&["GET"]).await;
    assert!(
        err.contains("wrong number of arguments"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn blocking_probes_return_nil_on_empty() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    assert_eq!(c.cmd(&["BLPOP", "missing", "5"]).await, Frame::NullArray);

    c.get_int(&["RPUSH", "L", "x"]).await;
    match c.cmd(&["BLPOP", "L", "5"]).await {
        Frame::Array(frames) => {
            assert!(bulk_eq(&frames[0], "L"));
            assert!(bulk_eq(&frames[1], "x"));
        }
        other => panic!("expected [key, element], got {other:?}"),
    }
}

#[tokio::test]
async fn scan_visits_every_key() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    for i in 0..40 {
        c.ok(&["SET", &format!("key:{i}"), "v"]).await;
    }

    let mut seen = std::collections::HashSet::new();
    let mut cursor = "0".to_string();
    loop {
        let reply = c.cmd(&["SCAN", &cursor, "COUNT", "7"]).await;
        let Frame::Array(parts) = reply else {
            panic!("expected SCAN reply array");
        };
        let Frame::Bulk(next) = &parts[0] else {
            panic!("expected cursor");
        };
        let Frame::Array(keys) = &parts[1] else {
            panic!("expected key batch");
        };
        for key in keys {
            if let Frame::Bulk(data) = key {
                seen.insert(String::from_utf8_lossy(data).to_string());
            }
        }
        cursor = String::from_utf8_lossy(next).to_string();
        if cursor == "0" {
            break;
        }
    }
    assert_eq!(seen.len(), 40);
}

#[tokio::test]
async fn pipelined_commands_all_answered() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    // write three commands in one burst, then read three replies
    let mut out = BytesMut::new();
    for args in [
        vec!["SET", "p", "1"],
        vec!["INCR", "p"],
        vec!["GET", "p"],
    ] {
        let parts: Vec<Frame> = args
            .iter()
            .map(|a| Frame::Bulk(Bytes::copy_from_slice(a.as_bytes())))
            .collect();
        Frame::Array(parts).serialize(&mut out);
    }
    c.stream.write_all(&out).await.unwrap();

    assert_eq!(c.read_frame().await, Frame::Simple("OK".into()));
    assert_eq!(c.read_frame().await, Frame::Integer(2));
    assert!(bulk_eq(&c.read_frame().await, "2"));
}

#[tokio::test]
async fn inline_commands_accepted() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.stream.write_all(b"PING\r\n").await.unwrap();
    assert_eq!(c.read_frame().await, Frame::Simple("PONG".into()));

    c.stream.write_all(b"SET inline works\r\n").await.unwrap();
    assert_eq!(c.read_frame().await, Frame::Simple("OK".into()));
    assert_eq!(c.get_bulk(&["GET", "inline"]).await.as_deref(), Some("works"));
}

#[tokio::test]
async fn info_reports_required_fields() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["SET", "k", "v"]).await;
    let info = c.get_bulk(&["INFO"]).await.expect("info blob");
    assert!(info.contains("redis_version:"));
    assert!(info.contains("role:master"));
    assert!(info.contains("connected_clients:"));
    assert!(info.contains("used_memory:"));
    assert!(info.contains("db0:keys=1,expires=0"));
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dbfile = dir.path().join("dump.rdb");

    let server = TestServer::start_with_dbfile(dbfile.clone(), None).await;
    let mut c = server.connect().await;

    c.ok(&["SET", "persisted", "yes"]).await;
    c.get_int(&["RPUSH", "plist", "a", "b"]).await;
    c.get_int(&["ZADD", "pz", "1.5", "m"]).await;
    c.ok(&["SELECT", "2"]).await;
    c.ok(&["SET", "other-db", "v"]).await;
    c.ok(&["SAVE"]).await;

    server.shutdown().await;

    let server = TestServer::start_with_dbfile(dbfile, None).await;
    let mut c = server.connect().await;

    assert_eq!(c.get_bulk(&["GET", "persisted"]).await.as_deref(), Some("yes"));
    assert_eq!(c.get_array(&["LRANGE", "plist", "0", "-1"]).await, ["a", "b"]);
    assert_eq!(c.get_bulk(&["ZSCORE", "pz", "m"]).await.as_deref(), Some("1.5"));
    c.ok(&["SELECT", "2"]).await;
    assert_eq!(c.get_bulk(&["GET", "other-db"]).await.as_deref(), Some("v"));

    drop(dir);
}

#[tokio::test]
async fn bgsave_writes_snapshot() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["SET", "k", "v"]).await;
    match c.cmd(&["BGSAVE"]).await {
        Frame::Simple(s) => assert!(s.contains("Background saving")),
        other => panic!("expected simple reply, got {other:?}"),
    }

    // wait for the background thread to finish the file
    let path = server.shared.config.dbfilename.clone();
    for _ in 0..50 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(path.exists(), "BGSAVE produced no snapshot file");
}

#[tokio::test]
async fn empty_collections_are_deleted() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.get_int(&["RPUSH", "L", "only"]).await;
    c.get_bulk(&["LPOP", "L"]).await;
    assert_eq!(c.get_int(&["EXISTS", "L"]).await, 0);

    c.get_int(&["SADD", "s", "m"]).await;
    c.get_int(&["SREM", "s", "m"]).await;
    assert_eq!(c.get_int(&["EXISTS", "s"]).await, 0);

    c.get_int(&["HSET", "h", "f", "v"]).await;
    c.get_int(&["HDEL", "h", "f"]).await;
    assert_eq!(c.get_int(&["EXISTS", "h"]).await, 0);

    c.get_int(&["ZADD", "z", "1", "m"]).await;
    c.get_int(&["ZREM", "z", "m"]).await;
    assert_eq!(c.get_int(&["EXISTS", "z"]).await, 0);
}

#[tokio::test]
async fn set_operations_and_stores() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.get_int(&["SADD", "s1", "a", "b", "c"]).await;
    c.get_int(&["SADD", "s2", "b", "c", "d"]).await;

    let mut inter = c.get_array(&["SINTER", "s1", "s2"]).await;
    inter.sort();
    assert_eq!(inter, ["b", "c"]);

    assert_eq!(c.get_int(&["SINTERSTORE", "dst", "s1", "s2"]).await, 2);
    assert_eq!(c.get_int(&["SCARD", "dst"]).await, 2);

    let mut diff = c.get_array(&["SDIFF", "s1", "s2"]).await;
    diff.sort();
    assert_eq!(diff, ["a"]);
}

#[tokio::test]
async fn getset_family() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    assert_eq!(c.get_bulk(&["GETSET", "k", "new"]).await, None);
    assert_eq!(c.get_bulk(&["GETSET", "k", "newer"]).await.as_deref(), Some("new"));
    assert_eq!(c.get_bulk(&["GETDEL", "k"]).await.as_deref(), Some("newer"));
    assert_eq!(c.get_int(&["EXISTS", "k"]).await, 0);

    // SET NX / XX conditional forms
    c.ok(&["SET", "c", "1", "NX"]).await;
    assert_eq!(c.cmd(&["SET", "c", "2", "NX"]).await, Frame::NullBulk);
    c.ok(&["SET", "c", "2", "XX"]).await;
    assert_eq!(c.get_bulk(&["GET", "c"]).await.as_deref(), Some("2"));
}

#[tokio::test]
async fn zset_pop_and_rank() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.get_int(&["ZADD", "z", "1", "a", "2", "b", "3", "c"]).await;

    assert_eq!(c.get_int(&["ZRANK", "z", "a"]).await, 0);
    assert_eq!(c.get_int(&["ZREVRANK", "z", "a"]).await, 2);
    assert_eq!(c.cmd(&["ZRANK", "z", "nope"]).await, Frame::NullBulk);

    assert_eq!(c.get_array(&["ZPOPMIN", "z"]).await, ["a", "1"]);
    assert_eq!(c.get_array(&["ZPOPMAX", "z"]).await, ["c", "3"]);
    assert_eq!(c.get_int(&["ZCARD", "z"]).await, 1);
}

#[tokio::test]
async fn expire_persist_ttl_lifecycle() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    c.ok(&["SET", "k", "v"]).await;
    assert_eq!(c.get_int(&["TTL", "k"]).await, -1);
    assert_eq!(c.get_int(&["TTL", "missing"]).await, -2);

    assert_eq!(c.get_int(&["EXPIRE", "k", "100"]).await, 1);
    let pttl = c.get_int(&["PTTL", "k"]).await;
    assert!(pttl > 99_000 && pttl <= 100_000, "pttl was {pttl}");

    assert_eq!(c.get_int(&["PERSIST", "k"]).await, 1);
    assert_eq!(c.get_int(&["TTL", "k"]).await, -1);

    // expiring a missing key reports 0
    assert_eq!(c.get_int(&["EXPIRE", "missing", "10"]).await, 0);
}

#[tokio::test]
async fn reaper_evicts_expired_keys_without_access() {
    let server = TestServer::start().await;
    let mut c = server.connect().await;

    for i in 0..10 {
        c.ok(&["SET", &format!("tmp:{i}"), "v", "PX", "50"]).await;
    }
    c.ok(&["SET", "stay", "v"]).await;

    // no reads of the expired keys — the reaper alone must evict them
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(c.get_int(&["DBSIZE"]).await, 1);
}
