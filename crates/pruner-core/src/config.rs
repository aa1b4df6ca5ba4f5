use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use pruner_store::{resolve_cache_root, CacheLocation, StoreSettings, CACHE_PATH_ENV};
use serde::{Deserialize, Serialize};

use crate::discovery::VolatileLayout;

pub const DEFAULT_CATALOG_URL: &str = "https://almenscorner.github.io/AppPruner/";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 60;

/// Invocation-wide options chosen on the command line.
///
/// Verbosity is carried here and handed to whoever needs it; nothing reads a
/// process-global debug switch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub debug: bool,
    pub json: bool,
}

impl GlobalOptions {
    /// Tracing level implied by the verbosity flags.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.trace {
            return "trace";
        }
        match (self.debug, self.verbose) {
            (_, v) if v >= 2 => "trace",
            (true, _) | (_, 1) => "debug",
            _ if self.quiet => "warn",
            _ => "info",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.var(key).map(str::trim).filter(|value| !value.is_empty())
    }

    fn seconds(&self, key: &str, default: u64) -> Result<Duration> {
        match self.non_empty(key) {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("{key} must be a whole number of seconds (got {raw:?})")),
            None => Ok(Duration::from_secs(default)),
        }
    }

    pub fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) catalog: CatalogConfig,
    pub(crate) discovery: DiscoveryConfig,
    pub(crate) user: UserConfig,
    pub(crate) process: ProcessConfig,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if the cache location cannot be resolved or a value is malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        let cache = match snapshot.non_empty(CACHE_PATH_ENV) {
            Some(path) => CacheLocation {
                path: absolutize(PathBuf::from(path))?,
                source: CACHE_PATH_ENV,
            },
            None => resolve_cache_root()?,
        };
        let mut volatile = VolatileLayout::default();
        if let Some(root) = snapshot.non_empty("PRUNER_VOLATILE_ROOT") {
            volatile.root = PathBuf::from(root);
        }
        if let Some(tokens) = snapshot.non_empty("PRUNER_VOLATILE_TYPE_TOKENS") {
            volatile.type_tokens = tokens
                .split(',')
                .map(|token| token.trim().to_lowercase())
                .filter(|token| !token.is_empty())
                .collect();
        }
        let uid = match snapshot.non_empty("PRUNER_CONSOLE_UID") {
            Some(raw) => Some(
                raw.parse::<u32>()
                    .with_context(|| format!("PRUNER_CONSOLE_UID must be numeric (got {raw:?})"))?,
            ),
            None => None,
        };

        Ok(Self {
            catalog: CatalogConfig {
                base_url: snapshot
                    .non_empty("PRUNER_CATALOG_URL")
                    .unwrap_or(DEFAULT_CATALOG_URL)
                    .to_string(),
                cache,
                http_timeout: snapshot.seconds("PRUNER_HTTP_TIMEOUT", DEFAULT_HTTP_TIMEOUT_SECS)?,
                index_ttl: snapshot.seconds("PRUNER_INDEX_TTL", 0)?,
                keep_proxies: keep_proxies(snapshot),
            },
            discovery: DiscoveryConfig { volatile },
            user: UserConfig {
                username: snapshot.non_empty("PRUNER_CONSOLE_USER").map(ToOwned::to_owned),
                invoking_user: invoking_user(snapshot),
                uid,
                home_base: snapshot
                    .non_empty("PRUNER_HOME_BASE")
                    .map_or_else(default_home_base, PathBuf::from),
            },
            process: ProcessConfig {
                timeout: snapshot
                    .seconds("PRUNER_PROCESS_TIMEOUT", DEFAULT_PROCESS_TIMEOUT_SECS)?,
            },
        })
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogConfig {
        &self.catalog
    }

    #[must_use]
    pub fn discovery(&self) -> &DiscoveryConfig {
        &self.discovery
    }

    #[must_use]
    pub fn user(&self) -> &UserConfig {
        &self.user
    }

    #[must_use]
    pub fn process(&self) -> &ProcessConfig {
        &self.process
    }

    /// Settings for opening the catalog store described by this configuration.
    #[must_use]
    pub fn store_settings(&self) -> StoreSettings {
        let mut settings = StoreSettings::new(
            self.catalog.cache.path.clone(),
            self.catalog.base_url.clone(),
        );
        settings.http_timeout = self.catalog.http_timeout;
        settings.index_ttl = self.catalog.index_ttl;
        settings.keep_proxies = self.catalog.keep_proxies;
        settings
    }
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub cache: CacheLocation,
    pub http_timeout: Duration,
    pub index_ttl: Duration,
    pub keep_proxies: bool,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub volatile: VolatileLayout,
}

#[derive(Debug, Clone)]
pub struct UserConfig {
    pub username: Option<String>,
    /// `SUDO_USER`, else `USER`; used when no console owner is known.
    pub invoking_user: Option<String>,
    pub uid: Option<u32>,
    pub home_base: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessConfig {
    pub timeout: Duration,
}

fn default_home_base() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/Users")
    } else {
        PathBuf::from("/home")
    }
}

fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

fn invoking_user(snapshot: &EnvSnapshot) -> Option<String> {
    ["SUDO_USER", "USER"]
        .iter()
        .filter_map(|key| snapshot.non_empty(key))
        .find(|name| *name != "root")
        .map(ToOwned::to_owned)
}

/// Decide whether catalog requests should honor proxy environment variables.
///
/// `PRUNER_KEEP_PROXIES` forces the decision either way; otherwise proxies are
/// used only when a proxy variable is set.
fn keep_proxies(snapshot: &EnvSnapshot) -> bool {
    match snapshot.var("PRUNER_KEEP_PROXIES") {
        Some(raw) => {
            let value = raw.trim().to_ascii_lowercase();
            !matches!(value.as_str(), "" | "0" | "false" | "no" | "off")
        }
        None => {
            const PROXY_KEYS: &[&str] = &[
                "HTTP_PROXY",
                "http_proxy",
                "HTTPS_PROXY",
                "https_proxy",
                "ALL_PROXY",
                "all_proxy",
            ];
            PROXY_KEYS
                .iter()
                .any(|key| snapshot.non_empty(key).is_some())
        }
    }
}
