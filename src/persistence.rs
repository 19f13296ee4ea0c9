//! Snapshot persistence for the performance and integrity stores.
//!
//! A [`Snapshot`] is serialized as one JSON document:
//!
//! ```json
//! { "performance": { "<agent>": { ... } }, "integrity": { "<agent>": { ... } } }
//! ```
//!
//! The medium is abstracted behind [`SnapshotStore`] (`read_all` /
//! `write_all`). [`FileSnapshotStore`] writes with an advisory lock and a
//! temp-file-then-rename so a crash mid-write leaves the previous snapshot
//! intact. Lock acquisition is bounded, so a lock held elsewhere surfaces as
//! [`PersistenceError::Lock`] instead of a hang.
//!
//! [`PersistenceGateway`] adds the fallback and timeout policy. A missing or
//! corrupt snapshot loads as the default agent set. Saves go to a single
//! writer thread that only keeps the newest unwritten snapshot, so a slow
//! write can delay later ones but never land after them.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::integrity::{self, IntegrityStore};
use crate::performance::{self, PerformanceStore};

/// How long [`FileSnapshotStore`] waits for its lock file by default.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("snapshot write did not finish within {0:?}")]
    Timeout(Duration),
    #[error("snapshot writer is still busy with an earlier write")]
    WriterBusy,
    #[error("snapshot write failed: {0}")]
    Write(String),
}

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub performance: PerformanceStore,
    #[serde(default)]
    pub integrity: IntegrityStore,
}

impl Snapshot {
    /// Empty records for each of `agents`.
    pub fn seeded(agents: &[String]) -> Self {
        Snapshot {
            performance: performance::seed_store(agents),
            integrity: integrity::seed_store(agents),
        }
    }

    pub fn into_parts(self) -> (PerformanceStore, IntegrityStore) {
        (self.performance, self.integrity)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistenceError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A medium that holds one snapshot blob.
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been written yet.
    fn read_all(&self) -> Result<Option<Vec<u8>>, PersistenceError>;
    fn write_all(&self, bytes: &[u8]) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// RAII guard for file locks - automatically releases lock on drop
struct FileLock {
    #[cfg(unix)]
    file: File,
}

impl FileLock {
    /// Acquire a lock on a lock file, giving up after `timeout`
    #[cfg(unix)]
    fn acquire(lock_path: &Path, mode: LockMode, timeout: Duration) -> Result<Self, PersistenceError> {
        use std::os::unix::io::AsRawFd;

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        let operation = match mode {
            LockMode::Shared => libc::LOCK_SH,
            LockMode::Exclusive => libc::LOCK_EX,
        } | libc::LOCK_NB;
        let deadline = Instant::now() + timeout;
        loop {
            let ret = unsafe { libc::flock(file.as_raw_fd(), operation) };
            if ret == 0 {
                return Ok(FileLock { file });
            }
            let err = std::io::Error::last_os_error();
            match err.kind() {
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
                    if Instant::now() < deadline =>
                {
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                std::io::ErrorKind::WouldBlock => {
                    return Err(PersistenceError::Lock(format!(
                        "Timed out after {:?} waiting for lock on {:?}",
                        timeout, lock_path
                    )));
                }
                _ => {
                    return Err(PersistenceError::Lock(format!(
                        "Failed to acquire lock on {:?}: {}",
                        lock_path, err
                    )));
                }
            }
        }
    }

    #[cfg(not(unix))]
    fn acquire(lock_path: &Path, _mode: LockMode, _timeout: Duration) -> Result<Self, PersistenceError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(FileLock {})
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = self.file.as_raw_fd();
            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }
        }
    }
}

/// Snapshot kept in a single JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSnapshotStore {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Bound how long reads and writes wait for the lock file.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        self.path.with_file_name(format!(".{}.lock", name))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn read_all(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let _lock = FileLock::acquire(&self.lock_path(), LockMode::Shared, self.lock_timeout)?;
        Ok(Some(std::fs::read(&self.path)?))
    }

    fn write_all(&self, bytes: &[u8]) -> Result<(), PersistenceError> {
        let _lock = FileLock::acquire(&self.lock_path(), LockMode::Exclusive, self.lock_timeout)?;

        let parent = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = parent.join(format!(".snapshot.tmp.{}", std::process::id()));

        let result = (|| -> Result<(), PersistenceError> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                std::fs::rename(&tmp_path, &self.path)?;
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }
}

/// State shared between a gateway and its writer thread.
#[derive(Default)]
struct WriterState {
    /// Newest snapshot not yet picked up by the writer.
    pending: Option<(u64, Vec<u8>)>,
    /// Last generation handed out by `submit`.
    submitted: u64,
    /// Highest generation the writer has finished, and how it went.
    written: u64,
    last_error: Option<String>,
    /// A waiter gave up on the write in progress.
    stalled: bool,
    started: bool,
    closed: bool,
}

#[derive(Default)]
struct WriterShared {
    state: Mutex<WriterState>,
    changed: Condvar,
}

impl WriterShared {
    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_writer(store: Arc<dyn SnapshotStore>, shared: Arc<WriterShared>) {
    loop {
        let (generation, bytes) = {
            let mut state = shared.lock();
            loop {
                if let Some(job) = state.pending.take() {
                    break job;
                }
                if state.closed {
                    return;
                }
                state = shared
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let result = store.write_all(&bytes);

        let mut state = shared.lock();
        state.written = generation;
        state.stalled = false;
        state.last_error = match result {
            Ok(()) => None,
            Err(e) => {
                warn!(generation, error = %e, "snapshot write failed");
                Some(e.to_string())
            }
        };
        shared.changed.notify_all();
    }
}

/// Load/save policy around a [`SnapshotStore`].
///
/// Snapshots are numbered in submission order. The writer always writes the
/// newest one it has been given, so a write never lands after a newer one.
pub struct PersistenceGateway {
    store: Arc<dyn SnapshotStore>,
    save_timeout: Duration,
    default_agents: Vec<String>,
    writer: Arc<WriterShared>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn SnapshotStore>, save_timeout: Duration, default_agents: Vec<String>) -> Self {
        PersistenceGateway {
            store,
            save_timeout,
            default_agents,
            writer: Arc::new(WriterShared::default()),
        }
    }

    /// Load the stored snapshot, falling back to the default agent set.
    ///
    /// Never fails: an unreadable or corrupt snapshot is logged and replaced.
    pub fn load(&self) -> Snapshot {
        match self.store.read_all() {
            Ok(Some(bytes)) => match Snapshot::from_bytes(&bytes) {
                Ok(snapshot) => {
                    info!(
                        agents = snapshot.performance.len(),
                        "loaded performance snapshot"
                    );
                    snapshot
                }
                Err(e) => {
                    warn!(error = %e, "snapshot is corrupt, starting from default agents");
                    Snapshot::seeded(&self.default_agents)
                }
            },
            Ok(None) => {
                info!(
                    agents = self.default_agents.len(),
                    "no snapshot found, seeding default agents"
                );
                Snapshot::seeded(&self.default_agents)
            }
            Err(e) => {
                warn!(error = %e, "failed to read snapshot, starting from default agents");
                Snapshot::seeded(&self.default_agents)
            }
        }
    }

    /// Write `snapshot` and wait for it, giving up after the configured timeout.
    ///
    /// A timed-out snapshot stays queued and is written unless a newer one
    /// replaces it first.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let generation = self.submit(snapshot)?;
        self.wait_for(generation)
    }

    /// Queue `snapshot` for the writer and return its generation.
    ///
    /// An older snapshot still waiting to be written is dropped.
    pub fn submit(&self, snapshot: &Snapshot) -> Result<u64, PersistenceError> {
        let bytes = snapshot.to_bytes()?;
        let mut state = self.writer.lock();
        if !state.started {
            let store = Arc::clone(&self.store);
            let shared = Arc::clone(&self.writer);
            thread::Builder::new()
                .name("snapshot-writer".to_string())
                .spawn(move || run_writer(store, shared))?;
            state.started = true;
        }

        state.submitted += 1;
        let generation = state.submitted;
        if let Some((superseded, _)) = state.pending.replace((generation, bytes)) {
            debug!(superseded, generation, "replaced unwritten snapshot");
        }
        self.writer.changed.notify_all();
        Ok(generation)
    }

    /// Wait until `generation`, or a newer snapshot, has been written.
    ///
    /// Returns [`PersistenceError::WriterBusy`] straight away when an earlier
    /// wait already timed out on the write still in progress.
    pub fn wait_for(&self, generation: u64) -> Result<(), PersistenceError> {
        let deadline = Instant::now() + self.save_timeout;
        let mut state = self.writer.lock();
        if state.stalled && state.written < generation {
            return Err(PersistenceError::WriterBusy);
        }
        while state.written < generation {
            let now = Instant::now();
            if now >= deadline {
                state.stalled = true;
                return Err(PersistenceError::Timeout(self.save_timeout));
            }
            let (guard, _) = self
                .writer
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }

        match &state.last_error {
            None => {
                debug!(generation, written = state.written, "snapshot saved");
                Ok(())
            }
            Some(e) => Err(PersistenceError::Write(e.clone())),
        }
    }
}

impl Drop for PersistenceGateway {
    /// Lets the writer finish whatever is queued, then exit.
    fn drop(&mut self) {
        self.writer.lock().closed = true;
        self.writer.changed.notify_all();
    }
}
