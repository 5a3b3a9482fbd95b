//! File-lock mechanism guarding session-store writes.
//!
//! A lock is a sibling file `<path>.lock` holding a JSON payload
//! `{pid, createdAt}`, acquired via exclusive-create (`O_EXCL`) with retry.
//! Reentrant by `realpath(path)`: two lock attempts against the same
//! canonical path contend for the same file regardless of how the caller
//! spelled it.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use oc_domain::error::{Error, Result};
use oc_domain::trace::TraceEvent;

/// Process-wide record of every lock file this process currently holds,
/// so a signal handler can release them all synchronously without
/// threading a `LockGuard` through to wherever the signal is caught
/// (spec.md §4.1 "Sync release on process exit signals {INT,TERM,QUIT,ABRT}").
fn held_locks() -> &'static Mutex<HashSet<PathBuf>> {
    static HELD: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    HELD.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Force-release every lock this process currently holds. Called from
/// the signal handlers installed by [`install_exit_handlers`]; safe to
/// call more than once.
pub fn release_all_held_locks() {
    let mut held = held_locks().lock();
    for path in held.drain() {
        let _ = fs::remove_file(&path);
    }
}

/// Install handlers for `SIGINT`/`SIGTERM`/`SIGQUIT`/`SIGABRT` (Unix) that
/// synchronously release every lock this process holds before exiting.
/// On non-Unix targets only Ctrl-C is available, so that is all we hook.
#[cfg(unix)]
pub fn install_exit_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    for kind in [SignalKind::interrupt(), SignalKind::terminate(), SignalKind::quit()] {
        tokio::spawn(async move {
            if let Ok(mut stream) = signal(kind) {
                stream.recv().await;
                tracing::warn!("received exit signal, releasing held session locks");
                release_all_held_locks();
                std::process::exit(130);
            }
        });
    }

    // SIGABRT is not one of tokio's named `SignalKind` constructors, but
    // its raw number (6 on Linux/macOS) works via `SignalKind::from_raw`.
    tokio::spawn(async move {
        if let Ok(mut stream) = signal(SignalKind::from_raw(6)) {
            stream.recv().await;
            tracing::warn!("received SIGABRT, releasing held session locks");
            release_all_held_locks();
            std::process::exit(134);
        }
    });
}

#[cfg(not(unix))]
pub fn install_exit_handlers() {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received Ctrl-C, releasing held session locks");
            release_all_held_locks();
            std::process::exit(130);
        }
    });
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockPayload {
    pub pid: u32,
    pub created_at: DateTime<Utc>,
}

/// Loosely-typed view of the lock payload used to distinguish "missing
/// field" from "unparseable JSON" during stale reclamation.
#[derive(Debug, Default, Deserialize)]
struct RawLockPayload {
    pid: Option<u32>,
    created_at: Option<DateTime<Utc>>,
}

/// Holds an acquired lock; the lock file is removed when this is dropped.
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Force-release held beyond the watchdog's `maxHoldMs`, independent of
    /// the normal drop path. Idempotent.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        held_locks().lock().remove(&self.path);
        let _ = fs::remove_file(&self.path);
    }
}

pub fn lock_path_for(session_store_path: &Path) -> PathBuf {
    let canonical = fs::canonicalize(session_store_path).unwrap_or_else(|_| session_store_path.to_path_buf());
    let mut p = canonical.into_os_string();
    p.push(".lock");
    PathBuf::from(p)
}

#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// A lock older than this (by `createdAt` or, on fallback, file mtime)
    /// is considered abandoned and reclaimed.
    pub stale_ms: i64,
    /// How long a caller retries before giving up.
    pub timeout_ms: i64,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            stale_ms: 30 * 60 * 1000,
            timeout_ms: 10_000,
        }
    }
}

/// Acquire the write lock for `session_store_path`, retrying with bounded
/// exponential backoff (capped at 1s) until `opts.timeout_ms` elapses.
pub async fn acquire(session_store_path: &Path, opts: &LockOptions) -> Result<LockGuard> {
    let lock_file = lock_path_for(session_store_path);
    let deadline = std::time::Instant::now() + Duration::from_millis(opts.timeout_ms.max(0) as u64);
    let mut delay_ms: u64 = 10;

    loop {
        match try_create(&lock_file) {
            Ok(()) => {
                held_locks().lock().insert(lock_file.clone());
                return Ok(LockGuard { path: lock_file });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if reclaim_if_stale(&lock_file, opts.stale_ms)? {
                    continue;
                }
                if std::time::Instant::now() >= deadline {
                    return Err(Error::Lock(format!(
                        "timed out acquiring session lock {}",
                        lock_file.display()
                    )));
                }
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(1000);
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

fn try_create(lock_file: &Path) -> std::io::Result<()> {
    if let Some(parent) = lock_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().write(true).create_new(true).open(lock_file)?;
    let payload = LockPayload {
        pid: std::process::id(),
        created_at: Utc::now(),
    };
    let json = serde_json::to_string(&payload).unwrap_or_default();
    f.write_all(json.as_bytes())?;
    f.flush()?;
    Ok(())
}

/// Returns `Ok(true)` when the existing lock was stale and has been
/// removed (the caller should retry acquisition), `Ok(false)` when it is
/// still live and the caller should keep waiting.
fn reclaim_if_stale(lock_file: &Path, stale_ms: i64) -> Result<bool> {
    let raw = match fs::read_to_string(lock_file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(Error::Io(e)),
    };

    let parsed: std::result::Result<RawLockPayload, _> = serde_json::from_str(&raw);

    let (stale, held_pid) = match parsed {
        Err(_) => {
            // Entirely unparseable payload: stale by definition.
            (true, None)
        }
        Ok(RawLockPayload {
            pid: Some(pid),
            created_at: Some(created_at),
        }) => {
            let pid_dead = !is_pid_alive(pid);
            let age_exceeded = (Utc::now() - created_at).num_milliseconds() > stale_ms;
            (pid_dead || age_exceeded, Some(pid))
        }
        Ok(raw) => {
            // pid or createdAt missing/malformed: fall back to file mtime.
            (mtime_stale(lock_file, stale_ms)?, raw.pid)
        }
    };

    if stale {
        TraceEvent::SessionLockStale {
            path: lock_file.display().to_string(),
            held_pid: held_pid.map(|p| p as i32),
        }
        .emit();
        match fs::remove_file(lock_file) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(Error::Io(e)),
        }
    } else {
        Ok(false)
    }
}

fn mtime_stale(lock_file: &Path, stale_ms: i64) -> Result<bool> {
    let meta = match fs::metadata(lock_file) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(Error::Io(e)),
    };
    let modified = meta.modified()?;
    let age = modified.elapsed().unwrap_or_default();
    Ok(age.as_millis() as i64 > stale_ms)
}

#[cfg(unix)]
pub fn is_pid_alive(pid: u32) -> bool {
    let alive = unsafe { libc::kill(pid as libc::pid_t, 0) == 0 };
    if !alive {
        return false;
    }
    // A zombie still answers signal 0; treat it as dead for reclamation.
    if let Ok(status) = fs::read_to_string(format!("/proc/{pid}/status")) {
        if let Some(line) = status.lines().find(|l| l.starts_with("State:")) {
            return !line.contains('Z');
        }
    }
    true
}

#[cfg(not(unix))]
pub fn is_pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("sessions.json");
        fs::write(&store_path, "{}").unwrap();

        let opts = LockOptions::default();
        let guard = acquire(&store_path, &opts).await.unwrap();
        assert!(guard.path().exists());
        drop(guard);
        assert!(!lock_path_for(&store_path).exists());
    }

    #[tokio::test]
    async fn second_acquirer_waits_then_succeeds_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("sessions.json");
        fs::write(&store_path, "{}").unwrap();

        let opts = LockOptions {
            stale_ms: 30 * 60 * 1000,
            timeout_ms: 2000,
        };
        let first = acquire(&store_path, &opts).await.unwrap();

        let store_path2 = store_path.clone();
        let handle = tokio::spawn(async move {
            let opts = LockOptions {
                stale_ms: 30 * 60 * 1000,
                timeout_ms: 2000,
            };
            acquire(&store_path2, &opts).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(first);

        let second = handle.await.unwrap();
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn stale_lock_with_dead_pid_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("sessions.json");
        fs::write(&store_path, "{}").unwrap();

        let lock_file = lock_path_for(&store_path);
        let payload = LockPayload {
            pid: 999_999, // very unlikely to be a live pid
            created_at: Utc::now(),
        };
        fs::write(&lock_file, serde_json::to_string(&payload).unwrap()).unwrap();

        let opts = LockOptions {
            stale_ms: 30 * 60 * 1000,
            timeout_ms: 2000,
        };
        let guard = acquire(&store_path, &opts).await.unwrap();
        assert!(guard.path().exists());
    }

    #[tokio::test]
    async fn stale_lock_by_age_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("sessions.json");
        fs::write(&store_path, "{}").unwrap();

        let lock_file = lock_path_for(&store_path);
        let payload = LockPayload {
            pid: std::process::id(),
            created_at: Utc::now() - chrono::Duration::hours(2),
        };
        fs::write(&lock_file, serde_json::to_string(&payload).unwrap()).unwrap();

        let opts = LockOptions {
            stale_ms: 30 * 60 * 1000,
            timeout_ms: 2000,
        };
        let guard = acquire(&store_path, &opts).await.unwrap();
        assert!(guard.path().exists());
    }

    #[tokio::test]
    async fn release_all_held_locks_drops_every_registered_file() {
        let dir = tempfile::tempdir().unwrap();
        let store_a = dir.path().join("a.json");
        let store_b = dir.path().join("b.json");
        fs::write(&store_a, "{}").unwrap();
        fs::write(&store_b, "{}").unwrap();

        let opts = LockOptions::default();
        let guard_a = acquire(&store_a, &opts).await.unwrap();
        let guard_b = acquire(&store_b, &opts).await.unwrap();
        let path_a = guard_a.path().to_path_buf();
        let path_b = guard_b.path().to_path_buf();
        assert!(path_a.exists() && path_b.exists());

        // Simulate a signal firing while both guards are still "held" by
        // forgetting them instead of dropping, matching how a live process
        // would be interrupted mid-turn with locks outstanding.
        std::mem::forget(guard_a);
        std::mem::forget(guard_b);

        release_all_held_locks();
        assert!(!path_a.exists());
        assert!(!path_b.exists());
    }

    #[tokio::test]
    async fn unparseable_payload_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("sessions.json");
        fs::write(&store_path, "{}").unwrap();

        let lock_file = lock_path_for(&store_path);
        fs::write(&lock_file, b"not json").unwrap();

        let opts = LockOptions::default();
        let guard = acquire(&store_path, &opts).await.unwrap();
        assert!(guard.path().exists());
    }
}
