//! Supervisor - owns the store subprocess lifecycle and the request/response
//! exchange.
//!
//! Flow:
//! 1. Spawn the store subprocess with the serialized snapshot as its argument
//! 2. For each operation: write one request line, read exactly one reply line
//! 3. On a timed-out or failed exchange: kill the store and clear the handle,
//!    since a reply may still be in flight for the abandoned request
//! 4. On stop: send STOP, force-kill if the acknowledgment does not arrive
//!
//! All state lives behind one async mutex held across the whole
//! write-then-read exchange, so concurrent callers serialize instead of
//! interleaving on the single reply stream. The child is spawned with
//! `kill_on_drop`, so dropping the supervisor on any exit path kills an
//! un-stopped store process.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::{ReplyCodec, RequestCodec};
use crate::bridge::protocol::{self, Reply, Request};

/// Name of the store binary shipped with this crate.
pub const STORE_BIN_NAME: &str = "sharedenv-store";

/// Environment variable overriding where the store binary is found.
pub const STORE_BIN_ENV: &str = "SHAREDENV_STORE_BIN";

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("a supervisor has already been constructed for this process")]
    MultipleInstance,
    #[error("store process is already running")]
    AlreadyRunning,
    #[error("store process is not running")]
    NotRunning,
    #[error("key `{0}` is not set")]
    NotSet(String),
    #[error("failed to spawn store process: {0}")]
    Spawn(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("timed out waiting for a reply from the store process")]
    ReplyTimeout,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] io::Error),
    #[error("store binary not found: {0}")]
    BinaryNotFound(String),
}

/// Extension point for different store spawn strategies.
///
/// The spawned child must have stdin and stdout piped - they carry the
/// protocol. Tests inject spawners to simulate crashed or silent stores.
pub trait StoreSpawner: Send + Sync {
    fn spawn(&self, seed_json: &str) -> Result<Child, SpawnError>;
}

/// Default spawner: launches the `sharedenv-store` binary with the seed JSON
/// as its sole argument.
///
/// Binary resolution order: explicit path, then `SHAREDENV_STORE_BIN`, then a
/// sibling of the current executable (with a `deps/` pop to cover cargo test
/// binaries).
pub struct StoreBinSpawner {
    binary: Option<PathBuf>,
}

impl StoreBinSpawner {
    pub fn new() -> Self {
        Self { binary: None }
    }

    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(path.into()),
        }
    }

    fn resolve_binary(&self) -> Result<PathBuf, SpawnError> {
        if let Some(path) = &self.binary {
            return Ok(path.clone());
        }
        if let Ok(path) = std::env::var(STORE_BIN_ENV) {
            return Ok(PathBuf::from(path));
        }

        let name = format!("{}{}", STORE_BIN_NAME, std::env::consts::EXE_SUFFIX);
        let exe = std::env::current_exe().map_err(SpawnError::Spawn)?;
        let mut dir = exe
            .parent()
            .map(PathBuf::from)
            .ok_or_else(|| SpawnError::BinaryNotFound(name.clone()))?;

        let candidate = dir.join(&name);
        if candidate.exists() {
            return Ok(candidate);
        }
        if dir.ends_with("deps") {
            dir.pop();
            let candidate = dir.join(&name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(SpawnError::BinaryNotFound(name))
    }
}

impl Default for StoreBinSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreSpawner for StoreBinSpawner {
    fn spawn(&self, seed_json: &str) -> Result<Child, SpawnError> {
        let binary = self.resolve_binary()?;
        tracing::debug!(binary = %binary.display(), "Spawning store binary");
        let child = Command::new(binary)
            .arg(seed_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        Ok(child)
    }
}

#[derive(Clone)]
pub struct SupervisorConfig {
    /// Bound on every blocking reply read. Without it a silent store would
    /// stall its caller forever.
    pub reply_timeout: Duration,
    pub spawner: Arc<dyn StoreSpawner>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(5),
            spawner: Arc::new(StoreBinSpawner::new()),
        }
    }
}

impl SupervisorConfig {
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn StoreSpawner>) -> Self {
        self.spawner = spawner;
        self
    }
}

/// Ownership of one live store process and both ends of its pipe pair.
struct StoreHandle {
    child: Child,
    writer: FramedWrite<ChildStdin, RequestCodec>,
    reader: FramedRead<ChildStdout, ReplyCodec>,
}

struct Inner {
    /// Local copy of the namespace, for display only. Updated optimistically
    /// on set; the store process holds the authoritative copy once running.
    snapshot: HashMap<String, String>,
    /// Present iff the supervisor considers itself running.
    store: Option<StoreHandle>,
}

/// Authoritative handle through which all callers in the host process access
/// the shared namespace. Enforces one store process at a time.
///
/// An ordinary constructible object - pass it around or share it as an
/// `Arc<Supervisor>`. Process-wide singleton access, when wanted, lives in
/// [`crate::registry`].
pub struct Supervisor {
    inner: Mutex<Inner>,
    reply_timeout: Duration,
    spawner: Arc<dyn StoreSpawner>,
}

impl Supervisor {
    pub fn new(initial_variables: HashMap<String, String>) -> Self {
        Self::with_config(initial_variables, SupervisorConfig::default())
    }

    pub fn with_config(initial_variables: HashMap<String, String>, config: SupervisorConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot: initial_variables,
                store: None,
            }),
            reply_timeout: config.reply_timeout,
            spawner: config.spawner,
        }
    }

    /// True iff a store process handle is present. Pure observation.
    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.store.is_some()
    }

    /// Spawn the store process, seeded with the current snapshot.
    pub async fn start(&self) -> Result<(), EnvError> {
        let mut inner = self.inner.lock().await;
        if inner.store.is_some() {
            return Err(EnvError::AlreadyRunning);
        }

        let seed = serde_json::to_string(&inner.snapshot)
            .map_err(|e| EnvError::Spawn(format!("failed to serialize snapshot: {e}")))?;

        tracing::debug!(vars = inner.snapshot.len(), "Starting store process");
        let mut child = self
            .spawner
            .spawn(&seed)
            .map_err(|e| EnvError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EnvError::Spawn("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EnvError::Spawn("stdout not captured".to_string()))?;

        inner.store = Some(StoreHandle {
            child,
            writer: FramedWrite::new(stdin, RequestCodec::new()),
            reader: FramedRead::new(stdout, ReplyCodec::new()),
        });
        tracing::info!("Store process running");
        Ok(())
    }

    /// Stop the store process.
    ///
    /// A clean `OK` acknowledgment lets the child exit on its own (reaped
    /// under a bounded wait); any other reply, or no reply at all, triggers a
    /// forced kill rather than trusting a possibly-hung process. The handle
    /// is always cleared. Returns the raw reply text for diagnostics - empty
    /// when no reply arrived.
    pub async fn stop(&self) -> Result<String, EnvError> {
        let mut inner = self.inner.lock().await;
        let Some(mut handle) = inner.store.take() else {
            return Err(EnvError::NotRunning);
        };

        match exchange(&mut handle, Request::Stop {}, self.reply_timeout).await {
            Ok(Reply::Ok) => {
                tracing::debug!("Store acknowledged stop");
                if tokio::time::timeout(self.reply_timeout, handle.child.wait())
                    .await
                    .is_err()
                {
                    tracing::warn!("Store did not exit after acknowledging stop, killing it");
                    let _ = handle.child.kill().await;
                }
                Ok(protocol::ACK_OK.to_string())
            }
            Ok(other) => {
                tracing::warn!(reply = other.as_text(), "Unexpected stop reply, killing store");
                let _ = handle.child.kill().await;
                Ok(other.into_text())
            }
            Err(err) => {
                tracing::warn!(error = %err, "No stop acknowledgment, killing store");
                let _ = handle.child.kill().await;
                Ok(String::new())
            }
        }
    }

    /// Store a value, returning the store's echo of it as confirmation.
    ///
    /// The local snapshot is updated optimistically before the exchange.
    pub async fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<String, EnvError> {
        let (key, value) = (key.into(), value.into());
        let mut guard = self.inner.lock().await;
        let Inner { snapshot, store } = &mut *guard;
        if store.is_none() {
            return Err(EnvError::NotRunning);
        }

        snapshot.insert(key.clone(), value.clone());
        let reply = checked_exchange(store, Request::Set { key, value }, self.reply_timeout).await?;
        Ok(reply.into_text())
    }

    pub async fn get(&self, key: impl Into<String>) -> Result<String, EnvError> {
        let key = key.into();
        let mut guard = self.inner.lock().await;

        let request = Request::Get { key: key.clone() };
        match checked_exchange(&mut guard.store, request, self.reply_timeout).await? {
            Reply::NotSet => Err(EnvError::NotSet(key)),
            other => Ok(other.into_text()),
        }
    }

    pub async fn exists(&self, key: impl Into<String>) -> Result<bool, EnvError> {
        let key = key.into();
        let mut guard = self.inner.lock().await;

        match checked_exchange(&mut guard.store, Request::Exists { key }, self.reply_timeout).await? {
            Reply::Yes => Ok(true),
            Reply::No => Ok(false),
            other => Err(EnvError::Protocol(format!(
                "unexpected EXISTS reply: {}",
                other.as_text()
            ))),
        }
    }

    /// Clone of the display snapshot. Possibly stale: reads always go through
    /// the store process, this is for introspection only.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.inner.lock().await.snapshot.clone()
    }

    /// Human-readable rendering of the snapshot, keys sorted.
    pub async fn describe(&self) -> String {
        let snapshot = self.snapshot().await;
        let mut keys: Vec<&String> = snapshot.keys().collect();
        keys.sort();
        let body = keys
            .iter()
            .map(|key| format!("{key}={}", snapshot[*key]))
            .collect::<Vec<String>>()
            .join(", ");
        format!("sharedenv: {{{body}}}")
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // kill_on_drop on the child does the actual cleanup.
        if self.inner.get_mut().store.is_some() {
            tracing::warn!("Supervisor dropped while store process running; child will be killed");
        }
    }
}

/// One exchange against the current handle, tearing it down on failure.
///
/// A timed-out or failed exchange leaves a request outstanding, so the reply
/// stream can no longer pair requests with replies: the next reply to arrive
/// would answer the wrong request. The child is killed and the handle
/// cleared; subsequent operations fail with [`EnvError::NotRunning`] until a
/// fresh `start()`.
async fn checked_exchange(
    store: &mut Option<StoreHandle>,
    request: Request,
    reply_timeout: Duration,
) -> Result<Reply, EnvError> {
    let handle = store.as_mut().ok_or(EnvError::NotRunning)?;
    match exchange(handle, request, reply_timeout).await {
        Ok(reply) => Ok(reply),
        Err(err) => {
            tracing::warn!(error = %err, "Exchange failed, killing store process");
            if let Some(mut handle) = store.take() {
                let _ = handle.child.kill().await;
            }
            Err(err)
        }
    }
}

/// One write-then-read exchange: the only way requests and replies move.
///
/// A closed output stream is a transport failure; an empty reply line
/// surfaces from the codec as a protocol violation.
async fn exchange(
    handle: &mut StoreHandle,
    request: Request,
    reply_timeout: Duration,
) -> Result<Reply, EnvError> {
    handle
        .writer
        .send(request)
        .await
        .map_err(|e| EnvError::Transport(format!("failed to write request: {e}")))?;

    let next = tokio::time::timeout(reply_timeout, handle.reader.next())
        .await
        .map_err(|_| EnvError::ReplyTimeout)?;

    match next {
        None => Err(EnvError::Transport(
            "store process closed its output stream".to_string(),
        )),
        Some(Err(err)) if err.kind() == io::ErrorKind::InvalidData => {
            Err(EnvError::Protocol(err.to_string()))
        }
        Some(Err(err)) => Err(EnvError::Transport(err.to_string())),
        Some(Ok(reply)) => Ok(reply),
    }
}
