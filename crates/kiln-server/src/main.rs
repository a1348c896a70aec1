//! kiln-server binary: CLI parsing, logging setup, runtime bootstrap.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use kiln_server::{run, Config};

/// A Redis-compatible in-memory data store.
#[derive(Debug, Parser)]
#[command(name = "kiln-server", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 6379)]
    port: u16,

    /// Host address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Log level.
    #[arg(short, long, default_value = "info", value_parser = ["debug", "info", "warning", "error"])]
    loglevel: String,

    /// Snapshot file path.
    #[arg(long, default_value = "dump.rdb")]
    dbfilename: PathBuf,

    /// Number of databases.
    #[arg(long, default_value_t = 16)]
    databases: usize,
}

fn main() -> ExitCode {
    // clap exits with status 2 on invalid arguments
    let cli = Cli::parse();

    init_logging(&cli.loglevel);

    // KILN_HOST / KILN_PORT take precedence when present
    let host = std::env::var("KILN_HOST").unwrap_or(cli.host);
    let port = std::env::var("KILN_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(cli.port);

    let config = Config {
        host,
        port,
        dbfilename: cli.dbfilename,
        databases: cli.databases,
        ..Config::default()
    };

    println!(
        "kiln v{} | port: {} | pid: {}",
        env!("CARGO_PKG_VERSION"),
        config.port,
        std::process::id()
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Maps the --loglevel flag onto an EnvFilter default; RUST_LOG still
/// wins when set.
fn init_logging(level: &str) {
    let level = match level {
        "warning" => "warn",
        other => other,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("kiln={level},kiln_server={level}").into()),
        )
        .init();
}
