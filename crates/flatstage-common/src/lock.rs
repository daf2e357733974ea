//! Cross-process advisory job lock
//!
//! Jobs writing to the same staging directory or checksum files coordinate
//! through an exclusive OS advisory lock on a well-known path. Acquisition
//! is poll-based with a hard timeout: the loser gets `Ok(None)` back, never
//! an unbounded block. The lock file itself carries no payload and is never
//! deleted by the releasing process; only its lock state matters.

use crate::error::{Result, StageError};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default hard limit on lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Default interval between acquisition attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// An exclusive advisory lock bound to a filesystem path.
pub struct JobLock {
    path: PathBuf,
    lock: fd_lock::RwLock<File>,
}

/// Proof of exclusive ownership; dropping it releases the lock.
pub struct JobLockGuard<'a> {
    _guard: fd_lock::RwLockWriteGuard<'a, File>,
}

impl JobLock {
    /// Open (creating if absent) the lock file at `path`.
    ///
    /// The file is opened without truncation and is never unlinked.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        Ok(Self {
            path,
            lock: fd_lock::RwLock::new(file),
        })
    }

    /// The path this lock is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make a single non-blocking acquisition attempt.
    ///
    /// `Ok(None)` means another process currently holds the lock.
    pub fn try_acquire(&mut self) -> Result<Option<JobLockGuard<'_>>> {
        match self.lock.try_write() {
            Ok(guard) => Ok(Some(JobLockGuard { _guard: guard })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(StageError::Io(e)),
        }
    }

    /// Run `work` while holding the lock exclusively.
    ///
    /// Polls every `poll` until the lock is free, for at most `timeout`.
    /// Returns `Ok(None)` when the timeout elapses without acquisition; the
    /// caller decides how loudly to fail (typically by raising
    /// [`StageError::LockTimeout`]).
    pub async fn run_exclusive<T, F>(
        &mut self,
        timeout: Duration,
        poll: Duration,
        work: F,
    ) -> Result<Option<T>>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        loop {
            match self.lock.try_write() {
                Ok(guard) => {
                    debug!(path = %self.path.display(), "lock acquired");
                    let out = work.await;
                    drop(guard);
                    debug!(path = %self.path.display(), "lock released");
                    return Ok(Some(out?));
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        debug!(
                            path = %self.path.display(),
                            waited_ms = waited.as_millis() as u64,
                            "lock wait timed out"
                        );
                        return Ok(None);
                    }
                    tokio::time::sleep(poll).await;
                },
                Err(e) => return Err(StageError::Io(e)),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_try_acquire_excludes_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.lock");

        let mut first = JobLock::open(&path).unwrap();
        let mut second = JobLock::open(&path).unwrap();

        let guard = first.try_acquire().unwrap();
        assert!(guard.is_some());

        // Distinct file handle on the same path must be refused.
        assert!(second.try_acquire().unwrap().is_none());

        drop(guard);
        assert!(second.try_acquire().unwrap().is_some());
    }

    #[test]
    fn test_lock_file_survives_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.lock");

        let mut lock = JobLock::open(&path).unwrap();
        let guard = lock.try_acquire().unwrap();
        drop(guard);
        drop(lock);

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_run_exclusive_returns_work_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = JobLock::open(dir.path().join("job.lock")).unwrap();

        let out = lock
            .run_exclusive(
                Duration::from_millis(200),
                Duration::from_millis(50),
                async { Ok(41 + 1) },
            )
            .await
            .unwrap();

        assert_eq!(out, Some(42));
    }

    #[tokio::test]
    async fn test_run_exclusive_times_out_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.lock");

        let mut holder = JobLock::open(&path).unwrap();
        let _held = holder.try_acquire().unwrap();

        let mut loser = JobLock::open(&path).unwrap();
        let started = Instant::now();
        let out = loser
            .run_exclusive(
                Duration::from_millis(300),
                Duration::from_millis(100),
                async { Ok(()) },
            )
            .await
            .unwrap();

        // Failure indicator within roughly timeout + one poll interval.
        assert!(out.is_none());
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
