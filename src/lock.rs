//! Named cross-process locks
//!
//! The stack registry is shared by every process on the machine that uses the
//! same local data directory. [`NamedLock`] is the seam: the default
//! [`FileLock`] takes an exclusive advisory lock on a file inside that
//! directory, and a different primitive can be injected without touching the
//! registry.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs4::FileExt;
use tracing::{debug, info};

use crate::error::Result;

/// A lock identified by name rather than by an in-process handle
pub trait NamedLock: Send + Sync {
    /// Human readable lock name (used in log messages)
    fn name(&self) -> &str;

    /// Block until the lock is held. Released when the guard is dropped.
    fn acquire(&self) -> Result<LockGuard>;
}

/// Scoped ownership of a [`NamedLock`]
///
/// Dropping the guard releases the lock on every exit path.
pub struct LockGuard {
    name: String,
    _held: Box<dyn Send>,
}

impl LockGuard {
    pub fn new(name: impl Into<String>, held: impl Send + 'static) -> Self {
        Self {
            name: name.into(),
            _held: Box::new(held),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!(lock = %self.name, "released");
    }
}

/// Exclusive advisory lock on a file
pub struct FileLock {
    path: PathBuf,
    name: String,
    wait_notice: bool,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self {
            path,
            name,
            wait_notice: true,
        }
    }

    /// Whether to log a notice before blocking on a contended lock
    pub fn with_wait_notice(mut self, wait_notice: bool) -> Self {
        self.wait_notice = wait_notice;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)?;
        Ok(file)
    }
}

struct HeldFile(File);

impl Drop for HeldFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

impl NamedLock for FileLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self) -> Result<LockGuard> {
        let file = self.open()?;
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) => {
                if err.kind() != ErrorKind::WouldBlock {
                    debug!(lock = %self.name, error = %err, "non-blocking lock attempt failed");
                }
                if self.wait_notice {
                    info!(lock = %self.name, "waiting for another process to release the lock");
                }
                file.lock_exclusive()?;
            }
        }
        debug!(lock = %self.name, "acquired");
        Ok(LockGuard::new(self.name.clone(), HeldFile(file)))
    }
}
