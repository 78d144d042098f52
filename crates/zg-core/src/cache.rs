//! Archive cache keyed by feed URL.
//!
//! Layout: `<root>/<sha256(url)>/{name}-{version}.{type}` plus a marker file
//! holding that basename. The marker is written last and atomically; an
//! entry without a marker, or whose marker names a missing file, does not
//! exist.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use zg_schema::Feed;

use crate::io::write_atomic;

/// Commit marker naming the archive file of an entry.
pub const MARKER_FILE_NAME: &str = "marker.zg";
/// Written once the archive of an entry has been installed successfully.
pub const RECEIPT_FILE_NAME: &str = "installed.zg";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("No cached archive for {0}")]
    NotFound(String),

    #[error("Cache IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T, CacheError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T, CacheError> {
        self.map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Stable, collision-resistant key for a feed URL: lowercase hex SHA-256.
pub fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct ArchiveCache {
    root: PathBuf,
}

impl ArchiveCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the entry for `url`.
    pub fn entry_dir(&self, url: &str) -> PathBuf {
        self.root.join(cache_key(url))
    }

    /// True iff the marker and the file it names both exist.
    pub fn exists(&self, url: &str) -> bool {
        self.get(url).is_ok()
    }

    /// Path of the committed archive for `url`.
    pub fn get(&self, url: &str) -> Result<PathBuf, CacheError> {
        let dir = self.entry_dir(url);
        let marker = dir.join(MARKER_FILE_NAME);
        let basename = match fs::read_to_string(&marker) {
            Ok(contents) => contents.trim().to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::NotFound(url.to_string()));
            }
            Err(e) => return Err(CacheError::Io { path: marker, source: e }),
        };

        // The marker must name a plain file inside the entry directory.
        let is_plain = !basename.is_empty()
            && Path::new(&basename).file_name() == Some(std::ffi::OsStr::new(&basename));
        if !is_plain {
            debug!(marker = %marker.display(), "Ignoring malformed cache marker");
            return Err(CacheError::NotFound(url.to_string()));
        }

        let archive = dir.join(&basename);
        if archive.is_file() {
            Ok(archive)
        } else {
            debug!(archive = %archive.display(), "Cache marker names a missing archive");
            Err(CacheError::NotFound(url.to_string()))
        }
    }

    /// Store `bytes` as the archive for `url` under
    /// [`Feed::archive_file_name`] and commit the entry.
    ///
    /// Any previous marker and install receipt are removed first, so a
    /// failure anywhere before the final marker write leaves no entry.
    pub fn put(&self, url: &str, feed: &Feed, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let dir = self.entry_dir(url);
        fs::create_dir_all(&dir).at(&dir)?;

        for stale in [MARKER_FILE_NAME, RECEIPT_FILE_NAME] {
            let path = dir.join(stale);
            match fs::remove_file(&path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => {
                    return Err(CacheError::Io { path, source: e });
                }
                _ => {}
            }
        }

        let basename = feed.archive_file_name();
        let archive = dir.join(&basename);
        write_atomic(&archive, bytes).at(&archive)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&archive, fs::Permissions::from_mode(0o644)).at(&archive)?;
        }

        let marker = dir.join(MARKER_FILE_NAME);
        write_atomic(&marker, basename.as_bytes()).at(&marker)?;
        info!(url, archive = %archive.display(), "Cached archive");
        Ok(archive)
    }

    /// Whether the committed entry for `url` has been installed.
    pub fn is_installed(&self, url: &str) -> bool {
        self.exists(url) && self.entry_dir(url).join(RECEIPT_FILE_NAME).is_file()
    }

    /// Record that the committed entry for `url` was installed.
    pub fn mark_installed(&self, url: &str) -> Result<(), CacheError> {
        let archive = self.get(url)?;
        let receipt = self.entry_dir(url).join(RECEIPT_FILE_NAME);
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        write_atomic(&receipt, name.as_bytes()).at(&receipt)
    }

    /// Forget that the entry for `url` is installed, keeping the archive.
    pub fn clear_installed(&self, url: &str) -> Result<(), CacheError> {
        let receipt = self.entry_dir(url).join(RECEIPT_FILE_NAME);
        match fs::remove_file(&receipt) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(CacheError::Io {
                path: receipt,
                source: e,
            }),
            _ => Ok(()),
        }
    }
}
