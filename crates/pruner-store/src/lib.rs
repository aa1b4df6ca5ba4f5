//! Verified local cache of the remote definition catalog.

#![deny(clippy::all)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod catalog;
mod error;
mod hash;
mod http;
mod layout;
mod lease;

pub use catalog::{
    CachedDefinition, CatalogStore, EntryStatus, RefreshOutcome, StoreSettings, SyncSummary,
};
pub use error::{CatalogError, CatalogErrorKind, CatalogResult};
pub use hash::{atomic_write, compute_sha256, sha256_hex};
pub use http::{CatalogClient, IndexResponse, INDEX_FILE_NAME};
pub use layout::{resolve_cache_root, CacheLayout, CacheLocation, CACHE_PATH_ENV};
pub use lease::{is_stale, LeaseGuard, LeaseRecord, UpdateLease, LEASE_TTL};
