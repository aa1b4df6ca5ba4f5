use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Leases older than this are considered abandoned.
pub const LEASE_TTL: Duration = Duration::from_secs(10 * 60);

/// Contents of the lease marker file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaseRecord {
    pub holder: String,
    pub acquired_at: u64,
}

impl LeaseRecord {
    fn for_current_process() -> Self {
        Self {
            holder: std::process::id().to_string(),
            acquired_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default(),
        }
    }
}

/// Whether a lease taken at `acquired_at` has outlived `ttl` at `now`.
///
/// A timestamp in the future is never stale.
pub fn is_stale(now: SystemTime, acquired_at: SystemTime, ttl: Duration) -> bool {
    now.duration_since(acquired_at)
        .map(|age| age > ttl)
        .unwrap_or(false)
}

/// Whole-catalog mutual exclusion backed by a create-if-absent marker file.
#[derive(Debug, Clone)]
pub struct UpdateLease {
    path: PathBuf,
    ttl: Duration,
}

impl UpdateLease {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_ttl(path, LEASE_TTL)
    }

    pub fn with_ttl(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes the lease, reclaiming it when the current marker is stale.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::LockContention`] when a live lease exists.
    pub fn acquire(&self) -> CatalogResult<LeaseGuard<'_>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| CatalogError::io(parent, err))?;
        }
        tracing::debug!(path = %self.path.display(), "acquiring update lease");
        match self.try_create() {
            Ok(()) => return Ok(self.guard()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(CatalogError::io(&self.path, err)),
        }

        let holder = self.current_holder();
        if !self.marker_is_stale() {
            tracing::debug!(holder = %holder, "lease present and not stale");
            return Err(CatalogError::LockContention {
                path: self.path.clone(),
                holder,
            });
        }

        tracing::info!(holder = %holder, path = %self.path.display(), "reclaiming stale update lease");
        self.reclaim()
    }

    /// Moves the marker aside under a name unique to this attempt and only
    /// proceeds if what was moved is still stale. A competing reclaimer that
    /// already installed a fresh marker gets it back, and this attempt
    /// reports contention instead of deleting it.
    fn reclaim(&self) -> CatalogResult<LeaseGuard<'_>> {
        let moved = self.reclaim_path();
        match fs::rename(&self.path, &moved) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(CatalogError::io(&self.path, err)),
        }
        if moved.exists() {
            let stale = fs::metadata(&moved)
                .and_then(|meta| meta.modified())
                .is_ok_and(|modified| is_stale(SystemTime::now(), modified, self.ttl));
            if !stale {
                let holder = holder_of(&moved);
                tracing::debug!(holder = %holder, "marker was renewed by another process; restoring it");
                if let Err(err) = fs::hard_link(&moved, &self.path) {
                    tracing::debug!(%err, "could not restore renewed marker");
                }
                let _ = fs::remove_file(&moved);
                return Err(CatalogError::LockContention {
                    path: self.path.clone(),
                    holder,
                });
            }
            if let Err(err) = fs::remove_file(&moved) {
                tracing::warn!(path = %moved.display(), %err, "failed to remove reclaimed marker");
            }
        }
        match self.try_create() {
            Ok(()) => Ok(self.guard()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(CatalogError::LockContention {
                path: self.path.clone(),
                holder: self.current_holder(),
            }),
            Err(err) => Err(CatalogError::io(&self.path, err)),
        }
    }

    fn reclaim_path(&self) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(format!(".reclaim-{}-{nanos}", std::process::id()));
        self.path.with_file_name(name)
    }

    /// Removes the marker. Missing markers are not an error.
    pub fn release(&self) {
        tracing::debug!(path = %self.path.display(), "releasing update lease");
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "failed to remove update lease");
            }
        }
    }

    fn try_create(&self) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        let record = LeaseRecord::for_current_process();
        let payload = serde_json::to_vec(&record).map_err(std::io::Error::other)?;
        file.write_all(&payload)?;
        Ok(())
    }

    fn marker_is_stale(&self) -> bool {
        match fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(modified) => is_stale(SystemTime::now(), modified, self.ttl),
            // Vanished between the failed create and now; let the retry decide.
            Err(err) if err.kind() == ErrorKind::NotFound => true,
            Err(_) => false,
        }
    }

    fn current_holder(&self) -> String {
        holder_of(&self.path)
    }

    fn guard(&self) -> LeaseGuard<'_> {
        tracing::debug!(path = %self.path.display(), "update lease acquired");
        LeaseGuard { lease: self }
    }
}

fn holder_of(path: &Path) -> String {
    fs::read(path)
        .ok()
        .and_then(|raw| serde_json::from_slice::<LeaseRecord>(&raw).ok())
        .map_or_else(|| "unknown".to_string(), |record| record.holder)
}

/// Releases the lease when dropped, including on error paths.
#[derive(Debug)]
pub struct LeaseGuard<'a> {
    lease: &'a UpdateLease,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.lease.release();
    }
}
