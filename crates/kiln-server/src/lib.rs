//! kiln-server: the Redis-compatible server.
//!
//! Wires the protocol, engine, and persistence crates together: a TCP
//! accept loop spawning per-connection tasks, a command dispatch
//! registry, the pub/sub hub, the expiry reaper, and the background
//! snapshotter. The binary entry point lives in `main.rs`; the library
//! surface exists so integration tests can run a server in-process.

pub mod commands;
pub mod config;
pub mod connection;
pub mod pubsub;
pub mod server;
pub mod session;
pub mod snapshotter;

pub use config::Config;
pub use server::run;
