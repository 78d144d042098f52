//! Fetcher: raw bytes from `file`, `http` and `https` URLs.
//!
//! There are no retries here. A failed fetch is returned as-is and the
//! caller decides whether the whole pipeline aborts.

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use thiserror::Error;
use tracing::debug;

use super::lexical_normalize;

const FILE_PREFIX: &str = "file://";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Unsupported URL scheme: {0} (expected file, http or https)")]
    UnsupportedScheme(String),

    #[error("Failed to read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GET {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

/// URL schemes the fetcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    File,
    Http,
}

fn scheme(url: &str) -> Option<Scheme> {
    let (scheme, _) = url.split_once("://")?;
    match scheme.to_ascii_lowercase().as_str() {
        "file" => Some(Scheme::File),
        "http" | "https" => Some(Scheme::Http),
        _ => None,
    }
}

/// Local path named by a `file://` URL: everything after the prefix.
pub fn file_url_path(url: &str) -> Option<&Path> {
    match scheme(url) {
        Some(Scheme::File) => Some(Path::new(&url[FILE_PREFIX.len()..])),
        _ => None,
    }
}

/// Canonical spelling of a feed URL for cache identity.
///
/// `file://` URLs have their path cleaned lexically so that
/// `file:///srv/./feeds//a.json` and `file:///srv/feeds/a.json` name the same
/// feed. Other URLs are returned unchanged.
pub fn normalize_feed_url(url: &str) -> String {
    match file_url_path(url) {
        Some(path) => format!("{FILE_PREFIX}{}", lexical_normalize(path).display()),
        None => url.to_string(),
    }
}

/// Retrieves bytes through a caller-configured HTTP client.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch the full contents behind `url`.
    ///
    /// HTTP bodies are read to the end before returning; a non-success
    /// status is an error rather than data.
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        match scheme(url) {
            Some(Scheme::File) => {
                let path = &url[FILE_PREFIX.len()..];
                debug!(path, "Reading local file");
                fs::read(path).map_err(|source| FetchError::File {
                    path: PathBuf::from(path),
                    source,
                })
            }
            Some(Scheme::Http) => {
                debug!(url, "GET");
                let response = self
                    .client
                    .get(url)
                    .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
                    .send()?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        url: url.to_string(),
                        status,
                    });
                }
                let body = response.bytes()?;
                debug!(url, bytes = body.len(), "Fetched");
                Ok(body.to_vec())
            }
            None => Err(FetchError::UnsupportedScheme(url.to_string())),
        }
    }
}
