//! Catalog synchronization and the verified definition cache.
//!
//! Only [`CatalogStore::sync_catalog`] mutates the cache as a whole, and it
//! does so under the update lease. Individual entries are written atomically
//! and trusted only while their digest matches the index.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use pruner_domain::{select_definition, IndexFile, IndexItem};
use serde::Serialize;

use crate::error::{CatalogError, CatalogResult};
use crate::hash::{atomic_write, compute_sha256, sha256_hex};
use crate::http::{CatalogClient, IndexResponse};
use crate::layout::CacheLayout;
use crate::lease::{UpdateLease, LEASE_TTL};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub cache_root: PathBuf,
    pub base_url: String,
    pub http_timeout: Duration,
    /// A non-forced refresh skips the network while the local index is younger.
    pub index_ttl: Duration,
    pub lease_ttl: Duration,
    pub keep_proxies: bool,
}

impl StoreSettings {
    pub fn new(cache_root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            cache_root: cache_root.into(),
            base_url: base_url.into(),
            http_timeout: Duration::from_secs(30),
            index_ttl: Duration::ZERO,
            lease_ttl: LEASE_TTL,
            keep_proxies: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Local index younger than the TTL; the network was not contacted.
    Fresh,
    NotModified,
    /// `200` carrying the entity tag already stored.
    Unchanged,
    Updated,
    /// Unexpected status; local state left as is.
    Skipped { status: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Hit,
    Fetched,
}

#[derive(Debug, Clone)]
pub struct CachedDefinition {
    pub path: PathBuf,
    pub status: EntryStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub refresh: Option<RefreshOutcome>,
    pub refresh_error: Option<String>,
    pub items: usize,
    pub hit: usize,
    pub fetched: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub pruned: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CatalogStore {
    layout: CacheLayout,
    client: CatalogClient,
    lease: UpdateLease,
    index_ttl: Duration,
}

impl CatalogStore {
    pub fn new(settings: StoreSettings) -> CatalogResult<Self> {
        let layout = CacheLayout::new(settings.cache_root);
        let client = CatalogClient::new(
            &settings.base_url,
            settings.http_timeout,
            settings.keep_proxies,
        )?;
        let lease = UpdateLease::with_ttl(layout.lease_path(), settings.lease_ttl);
        Ok(Self {
            layout,
            client,
            lease,
            index_ttl: settings.index_ttl,
        })
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn lease(&self) -> &UpdateLease {
        &self.lease
    }

    fn ensure_dirs(&self) -> CatalogResult<()> {
        for dir in [self.layout.defs_dir(), self.layout.meta_dir()] {
            fs::create_dir_all(&dir).map_err(|err| CatalogError::io(&dir, err))?;
        }
        Ok(())
    }

    /// Revalidates the local index against the catalog with a conditional GET.
    ///
    /// Callers are expected to hold the update lease.
    pub fn refresh(&self, force: bool) -> CatalogResult<RefreshOutcome> {
        self.ensure_dirs()?;
        let index_path = self.layout.index_path();
        if !force && self.index_is_fresh(&index_path) {
            tracing::debug!(ttl = ?self.index_ttl, "local index is fresh; skipping refresh");
            return Ok(RefreshOutcome::Fresh);
        }

        let etag_path = self.layout.etag_path();
        // An entity tag only vouches for the index it was stored with.
        let stored_etag = if index_is_readable(&index_path) {
            read_etag(&etag_path)
        } else {
            if etag_path.exists() {
                tracing::warn!(path = %etag_path.display(), "discarding entity tag without a readable index");
                remove_if_present(&etag_path)?;
            }
            None
        };
        tracing::debug!(force, etag = stored_etag.as_deref().unwrap_or("<none>"), "refreshing index");

        match self.client.fetch_index(stored_etag.as_deref())? {
            IndexResponse::NotModified => Ok(RefreshOutcome::NotModified),
            IndexResponse::Fetched { body, etag } => {
                if etag.is_some() && etag == stored_etag && index_path.exists() {
                    tracing::debug!("index entity tag unchanged; skipping write");
                    return Ok(RefreshOutcome::Unchanged);
                }
                // Refuse to replace a good index with one we cannot read.
                serde_json::from_slice::<IndexFile>(&body).map_err(|source| {
                    CatalogError::Decode {
                        path: index_path.clone(),
                        source,
                    }
                })?;
                atomic_write(&index_path, &body)?;
                match etag {
                    Some(etag) => atomic_write(&etag_path, etag.as_bytes())?,
                    None => remove_if_present(&etag_path)?,
                }
                tracing::info!(bytes = body.len(), "catalog index updated");
                Ok(RefreshOutcome::Updated)
            }
            IndexResponse::Unexpected { status } => {
                tracing::warn!(status, "index refresh returned an unexpected status; keeping local index");
                Ok(RefreshOutcome::Skipped { status })
            }
        }
    }

    fn index_is_fresh(&self, index_path: &Path) -> bool {
        if self.index_ttl.is_zero() {
            return false;
        }
        fs::metadata(index_path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age < self.index_ttl)
    }

    pub fn load_index(&self) -> CatalogResult<IndexFile> {
        let path = self.layout.index_path();
        tracing::debug!(path = %path.display(), "loading index");
        let raw = fs::read(&path).map_err(|err| CatalogError::io(&path, err))?;
        serde_json::from_slice(&raw).map_err(|source| CatalogError::Decode { path, source })
    }

    /// Returns the path of a verified cache entry for `item`, fetching it when
    /// the local copy is missing or does not match the indexed digest.
    pub fn ensure_definition(&self, item: &IndexItem) -> CatalogResult<CachedDefinition> {
        let dest = self.layout.entry_path(item);
        let expected = item.expected_sha256();
        tracing::debug!(id = %item.id, version = %item.version, "ensuring definition");

        if dest.exists() {
            match compute_sha256(&dest) {
                Ok(actual) if actual == expected => {
                    return Ok(CachedDefinition {
                        path: dest,
                        status: EntryStatus::Hit,
                    });
                }
                Ok(actual) => {
                    tracing::warn!(
                        path = %dest.display(),
                        expected = %expected,
                        actual = %actual,
                        "cached definition hash mismatch; refetching"
                    );
                }
                Err(err) => {
                    tracing::warn!(path = %dest.display(), %err, "cached definition unreadable; refetching");
                }
            }
            remove_if_present(&dest)?;
        }

        tracing::info!(id = %item.id, version = %item.version, path = %item.path, "fetching definition");
        let body = self.client.fetch_bytes(&item.path)?;
        let actual = sha256_hex(&body);
        if actual != expected {
            tracing::error!(
                id = %item.id,
                version = %item.version,
                expected = %expected,
                actual = %actual,
                "downloaded definition failed verification"
            );
            return Err(CatalogError::Integrity {
                id: item.id.clone(),
                version: item.version.clone(),
                expected,
                actual,
            });
        }
        atomic_write(&dest, &body)?;
        tracing::debug!(path = %dest.display(), "cached definition");
        Ok(CachedDefinition {
            path: dest,
            status: EntryStatus::Fetched,
        })
    }

    /// Refreshes the index, warms every listed definition and prunes entries
    /// the index no longer references. Holds the update lease throughout.
    ///
    /// # Errors
    ///
    /// Fails on lease contention or when no readable index exists after the
    /// refresh attempt. Refresh and per-item failures are recorded in the
    /// summary instead.
    pub fn sync_catalog(&self, force: bool) -> CatalogResult<SyncSummary> {
        self.ensure_dirs()?;
        let _lease = self.lease.acquire()?;
        let mut summary = SyncSummary::default();

        match self.refresh(force) {
            Ok(outcome) => summary.refresh = Some(outcome),
            Err(err) => {
                tracing::warn!(%err, "index refresh failed; continuing with the local index");
                summary.refresh_error = Some(err.to_string());
            }
        }

        let index = self.load_index()?;
        summary.items = index.items.len();
        for item in &index.items {
            match self.ensure_definition(item) {
                Ok(cached) => match cached.status {
                    EntryStatus::Hit => summary.hit += 1,
                    EntryStatus::Fetched => summary.fetched += 1,
                },
                Err(err) => {
                    tracing::warn!(id = %item.id, version = %item.version, %err, "prefetch failed");
                    summary.failed += 1;
                    summary.errors.push(err.to_string());
                }
            }
        }

        summary.pruned = self.prune(&index);
        Ok(summary)
    }

    /// Deletes cache entries that do not belong to an item of `index`.
    pub fn prune(&self, index: &IndexFile) -> Vec<PathBuf> {
        let defs_dir = self.layout.defs_dir();
        let entries = match fs::read_dir(&defs_dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(path = %defs_dir.display(), %err, "no definitions directory to prune");
                return Vec::new();
            }
        };
        let keep: HashSet<String> = index.items.iter().map(IndexItem::entry_file_name).collect();
        let mut removed = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if keep.contains(&name) {
                continue;
            }
            let path = entry.path();
            if !entry.file_type().is_ok_and(|kind| kind.is_file()) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(file = %name, "removed stale definition");
                    removed.push(path);
                }
                Err(err) => tracing::warn!(path = %path.display(), %err, "failed to remove stale definition"),
            }
        }
        removed.sort();
        removed
    }

    /// Selects a definition by name and optional version and returns its
    /// verified bytes, fetching it when it is not cached yet.
    pub fn load_definition(&self, name: &str, version: Option<&str>) -> CatalogResult<Vec<u8>> {
        tracing::info!(name, version = version.unwrap_or("<latest>"), "loading definition");
        let index = self.load_index()?;
        let item = select_definition(&index.items, name, version).ok_or_else(|| {
            CatalogError::NotFound {
                name: name.to_string(),
                version: version.map(ToOwned::to_owned),
            }
        })?;
        tracing::debug!(
            id = %item.id,
            version = %item.version,
            updated_at = %item.updated_at,
            "selected definition"
        );
        let cached = self.ensure_definition(item)?;
        fs::read(&cached.path).map_err(|err| CatalogError::io(&cached.path, err))
    }
}

fn index_is_readable(path: &Path) -> bool {
    fs::read(path)
        .ok()
        .is_some_and(|raw| serde_json::from_slice::<IndexFile>(&raw).is_ok())
}

fn read_etag(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|etag| !etag.is_empty())
}

fn remove_if_present(path: &Path) -> CatalogResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(CatalogError::io(path, err)),
    }
}
