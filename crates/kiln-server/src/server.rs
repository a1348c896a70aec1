//! TCP server: accept loop, background tasks, process-wide state.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use kiln_core::expiry::run_expiration_cycle;
use kiln_core::Store;

use crate::commands::Registry;
use crate::config::Config;
use crate::connection;
use crate::pubsub::PubSubHub;
use crate::snapshotter;

/// How often the reaper samples for expired keys.
const REAPER_INTERVAL: Duration = Duration::from_millis(100);

/// How often the snapshot policy is evaluated.
const SNAPSHOT_POLICY_INTERVAL: Duration = Duration::from_secs(1);

/// Process-wide state shared by every connection and background task.
pub struct Shared {
    /// The keyspace. One coarse lock; handlers never block while
    /// holding it, so each command is atomic and multi-key operations
    /// observe a consistent view.
    pub store: Mutex<Store>,
    pub pubsub: PubSubHub,
    pub registry: Registry,
    pub config: Config,
    /// Currently connected clients.
    pub connected_clients: AtomicUsize,
    /// Session id allocator.
    pub next_session_id: AtomicU64,
    /// Commands executed since startup.
    pub commands_processed: AtomicU64,
    /// Server start, for INFO uptime.
    pub started_at: Instant,
    /// Unix timestamp of the last completed snapshot.
    pub last_save_unix: AtomicU64,
    /// Flipped to `true` by SHUTDOWN or SIGTERM.
    pub shutdown: watch::Sender<bool>,
}

impl Shared {
    /// Builds process state around a (possibly restored) store.
    pub fn new(config: Config, store: Store) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            store: Mutex::new(store),
            pubsub: PubSubHub::new(),
            registry: Registry::new(),
            config,
            connected_clients: AtomicUsize::new(0),
            next_session_id: AtomicU64::new(1),
            commands_processed: AtomicU64::new(0),
            started_at: Instant::now(),
            last_save_unix: AtomicU64::new(unix_now_secs()),
            shutdown,
        })
    }

    /// Locks the store. Poisoning is unrecoverable misuse, so it is
    /// folded into the lock result.
    pub fn lock_store(&self) -> std::sync::MutexGuard<'_, Store> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records a completed snapshot: timestamps it and clears the
    /// dirty counter.
    pub fn mark_saved(&self, store: &mut Store) {
        store.reset_dirty();
        self.last_save_unix.store(unix_now_secs(), Ordering::Relaxed);
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Runs the server until SHUTDOWN or SIGTERM. Restores the snapshot,
/// binds the listener, spawns the reaper and snapshot tasks, then
/// accepts connections. Returns after a final snapshot on clean
/// shutdown.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = snapshotter::load(&config.dbfilename, config.databases);
    let shared = Shared::new(config, store);
    run_with_shared(shared).await
}

/// [`run`] with externally constructed state; the integration tests
/// use this to reach the shared handles.
pub async fn run_with_shared(shared: Arc<Shared>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(shared.config.bind_addr()).await?;
    serve(shared, listener).await
}

/// The accept loop over an already-bound listener. Tests bind to an
/// ephemeral port themselves and pass the listener in.
pub async fn serve(
    shared: Arc<Shared>,
    listener: TcpListener,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let local = listener.local_addr()?;
    info!(
        "kiln listening on {local} ({} databases)",
        shared.config.databases
    );

    spawn_reaper(Arc::clone(&shared));
    spawn_snapshot_policy(Arc::clone(&shared));

    let mut shutdown_rx = shared.shutdown.subscribe();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let shared = Arc::clone(&shared);
                        tokio::spawn(async move {
                            shared.connected_clients.fetch_add(1, Ordering::Relaxed);
                            if let Err(e) = connection::handle(stream, &shared).await {
                                debug!("connection error from {peer}: {e}");
                            }
                            shared.connected_clients.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("shutdown requested, closing listener");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, closing listener");
                let _ = shared.shutdown.send(true);
                break;
            }
            _ = terminate() => {
                info!("SIGTERM received, closing listener");
                let _ = shared.shutdown.send(true);
                break;
            }
        }
    }

    // final snapshot when there are unsaved changes
    let mut store = shared.lock_store();
    if store.dirty() > 0 {
        match snapshotter::save(&store, &shared.config.dbfilename) {
            Ok(()) => shared.mark_saved(&mut store),
            Err(e) => error!("final snapshot failed: {e}"),
        }
    }

    Ok(())
}

/// Resolves when SIGTERM arrives (never, on non-unix platforms).
#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}

/// The expiry reaper: every 100 ms, one sampling cycle over all
/// databases under the keyspace lock.
fn spawn_reaper(shared: Arc<Shared>) {
    tokio::spawn(async move {
        let mut tick = interval(REAPER_INTERVAL);
        let mut shutdown_rx = shared.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let removed = run_expiration_cycle(&mut shared.lock_store());
                    if removed > 0 {
                        debug!(removed, "active expiration cycle");
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    });
}

/// The snapshot policy loop: once a second, compare elapsed time and
/// accumulated writes against the configured `(seconds, changes)`
/// table and trigger a background save when a line matches.
fn spawn_snapshot_policy(shared: Arc<Shared>) {
    tokio::spawn(async move {
        let mut tick = interval(SNAPSHOT_POLICY_INTERVAL);
        let mut shutdown_rx = shared.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = tick.tick() => maybe_save(&shared).await,
                _ = shutdown_rx.changed() => break,
            }
        }
    });
}

async fn maybe_save(shared: &Arc<Shared>) {
    let last_save = shared.last_save_unix.load(Ordering::Relaxed);
    let elapsed = unix_now_secs().saturating_sub(last_save);

    // clone under the lock only when a policy line fires
    let clone = {
        let mut store = shared.lock_store();
        let dirty = store.dirty();
        let due = shared
            .config
            .save_policy
            .iter()
            .any(|&(secs, changes)| elapsed >= secs && dirty >= changes);
        if !due {
            return;
        }
        let clone = store.clone();
        shared.mark_saved(&mut store);
        clone
    };

    let path = shared.config.dbfilename.clone();
    let result = tokio::task::spawn_blocking(move || snapshotter::save(&clone, &path)).await;

    match result {
        Ok(Ok(())) => info!("background snapshot complete"),
        Ok(Err(e)) => error!("background snapshot failed: {e}"),
        Err(e) => error!("background snapshot task panicked: {e}"),
    }
}
