//! Explicit configuration for the pipeline.
//!
//! Locations follow the usual override-then-home pattern: an environment
//! variable wins, otherwise a directory under the user's home is used.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;
use zg_schema::HostPlatform;

use crate::verify::DEFAULT_KEYRING_CANDIDATES;

/// Overrides the zg home directory (`~/.zerogame`).
pub const ENV_HOME: &str = "ZG_HOME";
/// Overrides the GnuPG directory the keyring is read from (`~/.gnupg`).
pub const ENV_GNUPGHOME: &str = "GNUPGHOME";
/// Request timeout in whole seconds.
pub const ENV_HTTP_TIMEOUT: &str = "ZG_HTTP_TIMEOUT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine home directory. Set ZG_HOME and GNUPGHOME to override.")]
    NoHomeDir,

    #[error("Invalid ZG_HTTP_TIMEOUT value {0:?}: expected whole seconds")]
    InvalidTimeout(String),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Everything the installer needs to know about its environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the archive cache: `<cache_root>/<key>/...`.
    pub cache_root: PathBuf,
    /// Directory of the feed record database.
    pub records_root: PathBuf,
    /// Directory imported feed archives are stored under (`archives/<key>`).
    pub workspace: PathBuf,
    /// Directory searched for a keyring.
    pub keyring_dir: PathBuf,
    /// Keyring file names, in precedence order.
    pub keyring_candidates: Vec<String>,
    /// Request timeout applied to the HTTP client.
    pub http_timeout: Option<Duration>,
    /// Platform identifier matched against manifests.
    pub platform: HostPlatform,
    client: Client,
}

fn build_client(timeout: Option<Duration>) -> Result<Client, ConfigError> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

impl Config {
    /// Configuration rooted at `home` with the keyring read from `keyring_dir`.
    pub fn new(home: &Path, keyring_dir: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            cache_root: home.to_path_buf(),
            records_root: home.join("db"),
            workspace: home.to_path_buf(),
            keyring_dir: keyring_dir.to_path_buf(),
            keyring_candidates: DEFAULT_KEYRING_CANDIDATES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            http_timeout: None,
            platform: HostPlatform::current(),
            client: build_client(None)?,
        })
    }

    /// Resolve defaults from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), dirs::home_dir())
    }

    /// Resolve defaults from `lookup` (an environment) and the user's `home`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        home: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let zg_home = match var(ENV_HOME) {
            Some(dir) => PathBuf::from(dir),
            None => home.as_ref().ok_or(ConfigError::NoHomeDir)?.join(".zerogame"),
        };
        let keyring_dir = match var(ENV_GNUPGHOME) {
            Some(dir) => PathBuf::from(dir),
            None => home.as_ref().ok_or(ConfigError::NoHomeDir)?.join(".gnupg"),
        };
        let timeout = var(ENV_HTTP_TIMEOUT)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidTimeout(raw))
            })
            .transpose()?;

        Self::new(&zg_home, &keyring_dir)?.with_http_timeout(timeout)
    }

    pub fn with_cache_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_root = dir.into();
        self
    }

    pub fn with_records_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.records_root = dir.into();
        self
    }

    pub fn with_workspace(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace = dir.into();
        self
    }

    pub fn with_keyring_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.keyring_dir = dir.into();
        self
    }

    pub fn with_keyring_candidates(mut self, names: Vec<String>) -> Self {
        self.keyring_candidates = names;
        self
    }

    pub fn with_platform(mut self, platform: HostPlatform) -> Self {
        self.platform = platform;
        self
    }

    /// Rebuild the HTTP client with a request timeout.
    pub fn with_http_timeout(mut self, timeout: Option<Duration>) -> Result<Self, ConfigError> {
        self.client = build_client(timeout)?;
        self.http_timeout = timeout;
        Ok(self)
    }

    /// Use a caller-built HTTP client as-is.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}
