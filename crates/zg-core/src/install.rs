//! The orchestrator: fetch → verify → cache → extract → dispatch.

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};
use zg_schema::{Feed, SchemaError};

use crate::cache::{ArchiveCache, CacheError};
use crate::config::Config;
use crate::dispatch::{Action, CommandRunner, DispatchError, ProcessRunner, dispatch};
use crate::io::extract::{ExtractError, extract_zip};
use crate::io::fetch::{FetchError, Fetcher, normalize_feed_url};
use crate::reporter::{NullReporter, Reporter};
use crate::verify::{Keyring, ResolvedMethod, VerificationMethod, VerifyError};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Invalid feed: {0}")]
    Parse(#[from] SchemaError),

    #[error("Verification failed: {0}")]
    Verification(#[from] VerifyError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    #[error("Failed to create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("{0} is not installed")]
    NotInstalled(String),
}

impl InstallError {
    /// Pipeline stage the error came from.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Parse(_) => "parse",
            Self::Verification(_) => "verification",
            Self::Cache(_) | Self::NotInstalled(_) => "cache",
            Self::Extraction(_) | Self::Scratch(_) => "extraction",
            Self::Dispatch(e) if e.is_manifest_error() => "manifest",
            Self::Dispatch(_) => "subprocess",
        }
    }
}

/// Options for [`Installer::install_feed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    /// Skip fetching when the feed URL already has a committed cache entry.
    pub use_cache: bool,
    pub verification: VerificationMethod,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            verification: VerificationMethod::Auto,
        }
    }
}

/// What `install_feed` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The committed archive was installed before; nothing ran.
    AlreadyInstalled { archive: PathBuf },
    /// The install command ran and exited with code 0. `from_cache` is set
    /// when the archive was taken from the cache without fetching.
    Installed { archive: PathBuf, from_cache: bool },
}

/// Runs the installation pipeline for feed URLs.
#[derive(Debug)]
pub struct Installer<R = NullReporter, C = ProcessRunner> {
    config: Config,
    fetcher: Fetcher,
    cache: ArchiveCache,
    reporter: R,
    runner: C,
}

impl Installer {
    pub fn new(config: Config) -> Self {
        Self {
            fetcher: Fetcher::new(config.client().clone()),
            cache: ArchiveCache::new(&config.cache_root),
            config,
            reporter: NullReporter,
            runner: ProcessRunner,
        }
    }
}

impl<R: Reporter, C: CommandRunner> Installer<R, C> {
    pub fn with_reporter<R2: Reporter>(self, reporter: R2) -> Installer<R2, C> {
        Installer {
            config: self.config,
            fetcher: self.fetcher,
            cache: self.cache,
            reporter,
            runner: self.runner,
        }
    }

    pub fn with_runner<C2: CommandRunner>(self, runner: C2) -> Installer<R, C2> {
        Installer {
            config: self.config,
            fetcher: self.fetcher,
            cache: self.cache,
            reporter: self.reporter,
            runner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ArchiveCache {
        &self.cache
    }

    /// Fetch, parse and validate a feed descriptor.
    pub fn fetch_feed(&self, url: &str) -> Result<Feed, InstallError> {
        self.reporter.fetching("feed", url);
        let bytes = self.fetcher.fetch(url)?;
        let feed = Feed::from_slice(&bytes)?;
        feed.validate()?;
        Ok(feed)
    }

    /// Fetch the archive of `feed` under `method`. Nothing is returned
    /// unless verification passed.
    fn fetch_verified(
        &self,
        feed: &Feed,
        method: &ResolvedMethod,
    ) -> Result<Vec<u8>, InstallError> {
        self.reporter.fetching("archive", &feed.archive_url);
        let archive = self.fetcher.fetch(&feed.archive_url)?;

        let mut keyring = None;
        if let ResolvedMethod::DetachedSignature { signature_url } = method {
            self.reporter.fetching("signature", signature_url);
            let signature = self.fetcher.fetch(signature_url)?;

            self.reporter.verifying(method);
            let ring = self.keyring()?;
            let verified = ring.verify_detached(&signature, &archive, Utc::now())?;
            info!(key = %verified.fingerprint, "Feed signature verified");
            self.reporter.verified(&verified);
            keyring = Some(ring);
        }

        if !feed.is_archive_signed {
            return Ok(archive);
        }
        // The archive is itself a signed message; its payload is only usable
        // once a signature over it verifies.
        let ring = match keyring {
            Some(ring) => ring,
            None => self.keyring()?,
        };
        let (verified, payload) = ring.verify_message(&archive, Utc::now())?;
        self.reporter.verified(&verified);
        Ok(payload)
    }

    fn keyring(&self) -> Result<Keyring, VerifyError> {
        Keyring::load(&self.config.keyring_dir, &self.config.keyring_candidates)
    }

    /// Install the feed at `feed_url`.
    ///
    /// With `use_cache`, a feed whose archive is committed to the cache is
    /// not fetched again: if it was installed before this is a no-op,
    /// otherwise the cached archive is installed.
    #[instrument(skip(self))]
    pub fn install_feed(
        &self,
        feed_url: &str,
        options: InstallOptions,
    ) -> Result<InstallOutcome, InstallError> {
        let url = normalize_feed_url(feed_url);

        if options.use_cache {
            if let Ok(archive) = self.cache.get(&url) {
                if self.cache.is_installed(&url) {
                    info!(archive = %archive.display(), "Feed already installed");
                    self.reporter.already_installed(&url);
                    return Ok(InstallOutcome::AlreadyInstalled { archive });
                }
                self.reporter.warning(&format!(
                    "Installing previously downloaded archive {}",
                    archive.display()
                ));
                self.deploy(&archive, Action::Install)?;
                self.cache.mark_installed(&url)?;
                self.reporter.done("Installation complete!");
                return Ok(InstallOutcome::Installed {
                    archive,
                    from_cache: true,
                });
            }
        }

        self.reporter.loading_feed(&url);
        let feed = self.fetch_feed(&url)?;
        let method = options.verification.resolve(&feed)?;
        info!(name = %feed.name, version = %feed.version, %method, "Loaded feed");

        let bytes = self.fetch_verified(&feed, &method)?;

        self.reporter.caching(&self.cache.entry_dir(&url));
        self.cache.put(&url, &feed, &bytes)?;
        drop(bytes);

        // Install what was persisted, not what was fetched.
        let archive = self.cache.get(&url)?;
        self.deploy(&archive, Action::Install)?;
        self.cache.mark_installed(&url)?;
        self.reporter.done("Installation complete!");
        Ok(InstallOutcome::Installed {
            archive,
            from_cache: false,
        })
    }

    /// Run the uninstall or run command (or reinstall) of a cached feed.
    #[instrument(skip(self))]
    pub fn run_action(&self, feed_url: &str, action: Action) -> Result<(), InstallError> {
        let url = normalize_feed_url(feed_url);
        let archive = match self.cache.get(&url) {
            Ok(archive) => archive,
            Err(CacheError::NotFound(_)) => return Err(InstallError::NotInstalled(url)),
            Err(e) => return Err(e.into()),
        };

        self.deploy(&archive, action)?;
        match action {
            Action::Install => self.cache.mark_installed(&url)?,
            Action::Uninstall => self.cache.clear_installed(&url)?,
            Action::Run => {}
        }
        self.reporter.done(match action {
            Action::Install => "Installation complete!",
            Action::Uninstall => "Uninstall complete!",
            Action::Run => "Run complete!",
        });
        Ok(())
    }

    /// Extract `archive` into a fresh scratch directory and dispatch
    /// `action`. The scratch directory is removed on every path out.
    fn deploy(&self, archive: &Path, action: Action) -> Result<(), InstallError> {
        let scratch = tempfile::Builder::new()
            .prefix("zg-")
            .tempdir()
            .map_err(InstallError::Scratch)?;

        self.reporter.extracting(scratch.path());
        let files = extract_zip(archive, scratch.path())?;
        info!(files = files.len(), dir = %scratch.path().display(), "Extracted archive");

        dispatch(
            &files,
            scratch.path(),
            &self.config.platform,
            action,
            &self.runner,
            &self.reporter,
        )?;
        Ok(())
    }
}
