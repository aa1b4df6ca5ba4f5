use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use url::Url;

use crate::error::{CatalogError, CatalogResult};

const USER_AGENT: &str = concat!("pruner-store/", env!("CARGO_PKG_VERSION"));
pub const INDEX_FILE_NAME: &str = "index.json";

/// Result of a conditional index request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexResponse {
    /// `304 Not Modified`.
    NotModified,
    /// `200 OK` with the body and the entity tag the server sent, if any.
    Fetched { body: Vec<u8>, etag: Option<String> },
    /// Any other status; the caller leaves local state untouched.
    Unexpected { status: u16 },
}

/// Blocking client for a static catalog host.
///
/// Every request is bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: Client,
    base: Url,
}

impl CatalogClient {
    pub fn new(base_url: &str, timeout: Duration, keep_proxies: bool) -> CatalogResult<Self> {
        let base = parse_base(base_url)?;
        let mut builder = Client::builder().user_agent(USER_AGENT).timeout(timeout);
        if !keep_proxies {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(|source| CatalogError::Network {
            url: base.to_string(),
            source,
        })?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `GET {base}/index.json`, sending `If-None-Match` when an entity tag is known.
    pub fn fetch_index(&self, etag: Option<&str>) -> CatalogResult<IndexResponse> {
        let url = self.resolve(INDEX_FILE_NAME)?;
        let mut request = self.client.get(url.clone());
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        tracing::debug!(url = %url, if_none_match = etag.unwrap_or("<none>"), "fetching index");
        let response = request.send().map_err(|source| CatalogError::Network {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string());
        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            etag = etag.as_deref().unwrap_or("<none>"),
            "index response"
        );
        match status {
            StatusCode::NOT_MODIFIED => Ok(IndexResponse::NotModified),
            StatusCode::OK => {
                let body = response.bytes().map_err(|source| CatalogError::Network {
                    url: url.to_string(),
                    source,
                })?;
                Ok(IndexResponse::Fetched {
                    body: body.to_vec(),
                    etag,
                })
            }
            other => Ok(IndexResponse::Unexpected {
                status: other.as_u16(),
            }),
        }
    }

    /// `GET {base}/{path}`. Non-success statuses are errors.
    pub fn fetch_bytes(&self, path: &str) -> CatalogResult<Vec<u8>> {
        let url = self.resolve(path)?;
        tracing::debug!(url = %url, "fetching definition");
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|source| CatalogError::Network {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().map_err(|source| CatalogError::Network {
            url: url.to_string(),
            source,
        })?;
        tracing::debug!(url = %url, bytes = body.len(), "fetched definition");
        Ok(body.to_vec())
    }

    fn resolve(&self, relative: &str) -> CatalogResult<Url> {
        self.base
            .join(relative.trim_start_matches('/'))
            .map_err(|source| CatalogError::InvalidUrl {
                url: format!("{}{relative}", self.base),
                source,
            })
    }
}

fn parse_base(raw: &str) -> CatalogResult<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|source| CatalogError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}
