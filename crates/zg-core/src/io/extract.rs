//! Archive extraction module
//!
//! Unpacks zip archives into a destination root. Every entry name is checked
//! before anything is written, so an archive carrying a traversal entry
//! leaves the destination untouched.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error while extracting {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Entry {0:?} escapes the extraction root")]
    PathTraversal(String),
}

/// Information about an extracted entry
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Path relative to extraction root
    pub relative_path: PathBuf,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Directory entries are created without content
    pub is_dir: bool,
}

trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T, ExtractError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T, ExtractError> {
        self.map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Extract a zip archive into `dest_dir`.
///
/// Returns every file and directory created, in archive order. There is no
/// partial success: any failure aborts the whole extraction.
pub fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let file = File::open(archive_path).at(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut targets = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        match entry.enclosed_name() {
            Some(relative_path) => targets.push(relative_path),
            None => return Err(ExtractError::PathTraversal(entry.name().to_string())),
        }
    }

    fs::create_dir_all(dest_dir).at(dest_dir)?;
    let mut extracted_files = Vec::with_capacity(targets.len());

    for (i, relative_path) in targets.into_iter().enumerate() {
        let mut entry = archive.by_index(i)?;
        let absolute_path = dest_dir.join(&relative_path);

        if entry.is_dir() || relative_path.as_os_str().is_empty() {
            fs::create_dir_all(&absolute_path).at(&absolute_path)?;
            extracted_files.push(ExtractedFile {
                relative_path,
                absolute_path,
                is_dir: true,
            });
            continue;
        }

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }

        let mut outfile = File::create(&absolute_path).at(&absolute_path)?;
        io::copy(&mut entry, &mut outfile).at(&absolute_path)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode & 0o7777))
                .at(&absolute_path)?;
        }

        debug!(path = %relative_path.display(), "Extracted");
        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
            is_dir: false,
        });
    }

    Ok(extracted_files)
}
