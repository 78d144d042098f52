//! Feed record database and the feed repository built on it.
//!
//! One JSON document per feed, named by the same URL key the archive cache
//! uses. Imported archives live under `<workspace>/archives/<key>/`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};
use zg_schema::{Feed, FeedRecord, SchemaError};

use crate::cache::cache_key;
use crate::config::Config;
use crate::io::fetch::{FetchError, Fetcher, normalize_feed_url};
use crate::io::write_atomic;
use crate::verify::{Keyring, VerifyError};

/// Payload file name inside an imported feed's directory.
pub const ARCHIVE_FILE_NAME: &str = "archive";
/// Signed message the payload was unwrapped from.
pub const SIGNED_ARCHIVE_FILE_NAME: &str = "archive.signed";

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("No feed record for {0}")]
    NotFound(String),

    #[error("Record IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Verification failed: {0}")]
    Verification(#[from] VerifyError),
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> RecordError + '_ {
    move |source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct FeedRecordDb {
    root: PathBuf,
}

impl FeedRecordDb {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, url: &str) -> PathBuf {
        self.root.join(format!("{}.json", cache_key(url)))
    }

    /// Insert or replace the record for `url`.
    pub fn put(&self, url: &str, record: &FeedRecord) -> Result<(), RecordError> {
        fs::create_dir_all(&self.root).map_err(io_at(&self.root))?;
        let path = self.record_path(url);
        let json = record.to_json()?;
        write_atomic(&path, json.as_bytes()).map_err(io_at(&path))?;
        debug!(url, path = %path.display(), "Stored feed record");
        Ok(())
    }

    pub fn get(&self, url: &str) -> Result<FeedRecord, RecordError> {
        let path = self.record_path(url);
        match fs::read(&path) {
            Ok(bytes) => Ok(FeedRecord::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(RecordError::NotFound(url.to_string()))
            }
            Err(e) => Err(io_at(&path)(e)),
        }
    }

    pub fn remove(&self, url: &str) -> Result<(), RecordError> {
        let path = self.record_path(url);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(RecordError::NotFound(url.to_string()))
            }
            Err(e) => Err(io_at(&path)(e)),
        }
    }

    /// Every record, sorted by feed URL.
    pub fn records(&self) -> Result<Vec<FeedRecord>, RecordError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_at(&self.root)(e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_at(&self.root))?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let bytes = fs::read(&path).map_err(io_at(&path))?;
            records.push(FeedRecord::from_slice(&bytes)?);
        }
        records.sort_by(|a, b| a.feed_url.cmp(&b.feed_url));
        Ok(records)
    }
}

/// Imports feeds into a local workspace and tracks them in the database.
#[derive(Debug, Clone)]
pub struct FeedRepository {
    db: FeedRecordDb,
    workspace: PathBuf,
    fetcher: Fetcher,
    keyring_dir: PathBuf,
    keyring_candidates: Vec<String>,
}

impl FeedRepository {
    pub fn new(config: &Config) -> Self {
        Self {
            db: FeedRecordDb::new(&config.records_root),
            workspace: config.workspace.clone(),
            fetcher: Fetcher::new(config.client().clone()),
            keyring_dir: config.keyring_dir.clone(),
            keyring_candidates: config.keyring_candidates.clone(),
        }
    }

    pub fn db(&self) -> &FeedRecordDb {
        &self.db
    }

    fn feed_dir(&self, url: &str) -> PathBuf {
        self.workspace.join("archives").join(cache_key(url))
    }

    /// Fetch a feed and its archive into the workspace and record it.
    ///
    /// A feed marked `is_archive_signed` serves an OpenPGP signed message:
    /// it is kept as `archive.signed` and its verified payload written to
    /// `archive`. Verification happens before anything is written, so a
    /// failed import leaves an earlier import of the same feed untouched.
    pub fn import_feed(&self, url: &str) -> Result<FeedRecord, RecordError> {
        let url = normalize_feed_url(url);
        let feed = Feed::from_slice(&self.fetcher.fetch(&url)?)?;
        feed.validate()?;
        let archive = self.fetcher.fetch(&feed.archive_url)?;

        let payload = if feed.is_archive_signed {
            let keyring = Keyring::load(&self.keyring_dir, &self.keyring_candidates)?;
            let (verified, payload) = keyring.verify_message(&archive, Utc::now())?;
            info!(key = %verified.fingerprint, "Unwrapped signed archive");
            Some(payload)
        } else {
            None
        };

        let dir = self.feed_dir(&url);
        fs::create_dir_all(&dir).map_err(io_at(&dir))?;
        let archive_path = dir.join(ARCHIVE_FILE_NAME);
        let signed_path = dir.join(SIGNED_ARCHIVE_FILE_NAME);

        let feed_signed_archive_path = match payload {
            Some(payload) => {
                write_atomic(&signed_path, &archive).map_err(io_at(&signed_path))?;
                write_atomic(&archive_path, &payload).map_err(io_at(&archive_path))?;
                Some(signed_path)
            }
            None => {
                write_atomic(&archive_path, &archive).map_err(io_at(&archive_path))?;
                match fs::remove_file(&signed_path) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => {
                        return Err(io_at(&signed_path)(e));
                    }
                    _ => {}
                }
                None
            }
        };
        let record = FeedRecord {
            feed_url: url.clone(),
            feed_archive_path: archive_path,
            feed_signed_archive_path,
        };

        self.db.put(&url, &record)?;
        info!(url, name = %feed.name, version = %feed.version, "Imported feed");
        Ok(record)
    }

    pub fn get_feed(&self, url: &str) -> Result<FeedRecord, RecordError> {
        self.db.get(&normalize_feed_url(url))
    }

    pub fn feeds(&self) -> Result<Vec<FeedRecord>, RecordError> {
        self.db.records()
    }

    /// Forget a feed and delete its imported files.
    pub fn remove_feed(&self, url: &str) -> Result<(), RecordError> {
        let url = normalize_feed_url(url);
        self.db.remove(&url)?;
        let dir = self.feed_dir(&url);
        match fs::remove_dir_all(&dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(io_at(&dir)(e)),
            _ => Ok(()),
        }
    }
}
