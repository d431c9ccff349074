//! Stale-tolerant, filesystem-backed advisory lock.
//!
//! The algorithm is the POSIX hard-link trick: a lock is "held" when a uniquely-named
//! temp file has been hard-linked to the lock path and the temp file's link count is 2.
//! This works on any filesystem that supports hard links within a directory, without
//! requiring `flock`/`fcntl` advisory-lock support.

use std::fs::{self, File};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::error::{BridgeError, Result};

/// An advisory lock over a single path, with stale-lock reclamation.
pub struct GroupLock {
    path: PathBuf,
    expiry: Duration,
    token: Option<PathBuf>,
}

impl GroupLock {
    /// Create a lock handle for `path`. Does not touch the filesystem.
    pub fn new(path: impl Into<PathBuf>, expiry: Duration) -> Self {
        Self {
            path: path.into(),
            expiry,
            token: None,
        }
    }

    /// Attempt to acquire the lock without blocking.
    ///
    /// Returns `Ok(true)` if acquired, `Ok(false)` if held by another live process.
    pub fn trylock(&mut self) -> Result<bool> {
        if self.token.is_some() {
            return Err(BridgeError::AlreadyHeld);
        }

        if let Ok(metadata) = fs::metadata(&self.path) {
            let age = SystemTime::now()
                .duration_since(metadata.modified()?)
                .unwrap_or(Duration::ZERO);
            if age < self.expiry {
                return Ok(false);
            }
            // Stale: best-effort unlink. A concurrent racer doing the same is benign
            // because the link-count check below is the authoritative test.
            let _ = fs::remove_file(&self.path);
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = dir.join(format!(
            ".lock-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        File::create(&tmp)?;

        let _ = fs::hard_link(&tmp, &self.path);
        let link_count = fs::metadata(&tmp)?.nlink();
        if link_count == 2 {
            self.token = Some(tmp);
            Ok(true)
        } else {
            let _ = fs::remove_file(&tmp);
            Ok(false)
        }
    }

    /// Block until the lock is acquired, retrying on a fixed back-off.
    pub async fn lock(&mut self) -> Result<()> {
        loop {
            if self.trylock()? {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    /// Refresh the lock's freshness. Returns `Ok(false)` if the lock was snatched
    /// (another actor removed the lock path out from under us).
    pub fn touch(&self) -> Result<bool> {
        let token = self.token.as_ref().ok_or(BridgeError::NotHeld)?;
        let link_count = fs::metadata(token)?.nlink();
        if link_count < 2 {
            warn!(path = %self.path.display(), "lock snatched by another actor");
            return Ok(false);
        }
        let now = filetime_now();
        filetime_set(token, now)?;
        Ok(true)
    }

    /// Release the lock. A snatched lock is logged, not treated as an error.
    pub fn unlock(&mut self) -> Result<()> {
        let token = self.token.take().ok_or(BridgeError::NotHeld)?;
        let link_count = fs::metadata(&token).map(|m| m.nlink()).unwrap_or(1);
        let _ = fs::remove_file(&token);
        if link_count == 2 {
            let _ = fs::remove_file(&self.path);
        } else {
            warn!(path = %self.path.display(), "lock was already snatched at unlock time");
        }
        Ok(())
    }

    /// True if this handle currently believes it holds the lock.
    pub fn is_held(&self) -> bool {
        self.token.is_some()
    }
}

impl Drop for GroupLock {
    fn drop(&mut self) {
        if self.token.is_some() {
            let _ = self.unlock();
        }
    }
}

fn filetime_now() -> SystemTime {
    SystemTime::now()
}

fn filetime_set(path: &Path, time: SystemTime) -> Result<()> {
    let file = File::options().write(true).open(path)?;
    file.set_modified(time)?;
    Ok(())
}
