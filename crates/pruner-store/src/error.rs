use std::path::PathBuf;

/// Structured kind of a catalog failure, used to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogErrorKind {
    Network,
    Integrity,
    LockContention,
    NotFound,
    Io,
    Decode,
    InvalidUrl,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("sha256 mismatch for {id}@{version} (expected {expected}, got {actual})")]
    Integrity {
        id: String,
        version: String,
        expected: String,
        actual: String,
    },
    #[error("another catalog update is in progress (lease {} held by {holder})", path.display())]
    LockContention { path: PathBuf, holder: String },
    #[error("{}", not_found_message(name, version.as_deref()))]
    NotFound {
        name: String,
        version: Option<String>,
    },
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CatalogError {
    #[must_use]
    pub fn kind(&self) -> CatalogErrorKind {
        match self {
            Self::Network { .. } | Self::HttpStatus { .. } => CatalogErrorKind::Network,
            Self::Integrity { .. } => CatalogErrorKind::Integrity,
            Self::LockContention { .. } => CatalogErrorKind::LockContention,
            Self::NotFound { .. } => CatalogErrorKind::NotFound,
            Self::Io { .. } => CatalogErrorKind::Io,
            Self::Decode { .. } => CatalogErrorKind::Decode,
            Self::InvalidUrl { .. } => CatalogErrorKind::InvalidUrl,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn not_found_message(name: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("no definition for {name} (version {version})"),
        None => format!("no definition for {name}"),
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
