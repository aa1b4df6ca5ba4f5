use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;
use pruner_domain::IndexItem;

use crate::http::INDEX_FILE_NAME;

pub const CACHE_PATH_ENV: &str = "PRUNER_CACHE_PATH";

/// On-disk layout of the catalog cache.
///
/// ```text
/// <root>/index.json
/// <root>/index.json.etag
/// <root>/defs/<escaped-id>@<version>.json
/// <root>/meta/update.lock
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    pub fn etag_path(&self) -> PathBuf {
        self.root.join(format!("{INDEX_FILE_NAME}.etag"))
    }

    pub fn defs_dir(&self) -> PathBuf {
        self.root.join("defs")
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }

    pub fn lease_path(&self) -> PathBuf {
        self.meta_dir().join("update.lock")
    }

    pub fn entry_path(&self, item: &IndexItem) -> PathBuf {
        self.defs_dir().join(item.entry_file_name())
    }
}

#[derive(Debug, Clone)]
pub struct CacheLocation {
    pub path: PathBuf,
    pub source: &'static str,
}

/// Resolves the cache root: `PRUNER_CACHE_PATH`, then the machine-wide
/// location on macOS, then the user cache directory elsewhere.
pub fn resolve_cache_root() -> Result<CacheLocation> {
    if let Some(override_path) = env::var_os(CACHE_PATH_ENV) {
        let path = absolutize(PathBuf::from(override_path))?;
        return Ok(CacheLocation {
            path,
            source: CACHE_PATH_ENV,
        });
    }

    #[cfg(target_os = "macos")]
    let (path, source) = (
        PathBuf::from("/Library/Application Support/AppPruner"),
        "/Library/Application Support",
    );
    #[cfg(not(target_os = "macos"))]
    let (path, source) = {
        let (base, source) = resolve_unix_cache_base()?;
        (base.join("pruner"), source)
    };

    Ok(CacheLocation { path, source })
}

#[cfg(not(target_os = "macos"))]
fn resolve_unix_cache_base() -> Result<(PathBuf, &'static str)> {
    if let Some(xdg) = env::var_os("XDG_CACHE_HOME") {
        return Ok((PathBuf::from(xdg), "XDG_CACHE_HOME"));
    }
    let home = dirs_next::home_dir()
        .ok_or_else(|| anyhow::anyhow!("unable to determine home directory"))?;
    Ok((home.join(".cache"), "~/.cache"))
}

fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(env::current_dir()?.join(path))
    }
}
