//! The feed descriptor: a small JSON document naming an installable archive.

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};

/// Container format of a feed's archive.
///
/// Only zip archives are produced by feed authors today; the enum exists so
/// a new format is a compile-time exhaustive change rather than a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    /// A PKZIP archive (`.zip`).
    #[default]
    Zip,
}

impl ArchiveType {
    /// File extension used when the archive is written to disk.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
        }
    }
}

impl std::fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Describes an archive to install.
///
/// The identity of a feed for caching is the URL it was loaded from, not
/// any field in here: the same URL may serve successive versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    /// Display name of the feed (e.g. "hello").
    pub name: String,

    /// Version string, used to distinguish feeds with the same name.
    pub version: String,

    /// URL the archive is fetched from (`file`, `http` or `https`).
    pub archive_url: String,

    /// Archive format; always zip for now.
    pub archive_type: ArchiveType,

    /// URL of a detached OpenPGP signature over the archive, if any.
    ///
    /// Feed authors frequently emit an empty string instead of omitting the
    /// key; use [`Feed::signature_url`] which treats both the same.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpg_signature_url: Option<String>,

    /// Whether the archive is itself an OpenPGP signed message that must be
    /// unwrapped before use.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_archive_signed: bool,
}

impl Feed {
    /// Parse a feed descriptor from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] if the text is not a feed document.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(text).map_err(|source| SchemaError::Parse {
            document: "feed",
            source,
        })
    }

    /// Parse a feed descriptor from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] if the bytes are not a feed document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SchemaError> {
        serde_json::from_slice(bytes).map_err(|source| SchemaError::Parse {
            document: "feed",
            source,
        })
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Serialize`] if encoding fails.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        serde_json::to_string_pretty(self).map_err(|source| SchemaError::Serialize {
            document: "feed",
            source,
        })
    }

    /// The detached signature URL, or `None` when absent or empty.
    pub fn signature_url(&self) -> Option<&str> {
        self.gpg_signature_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Basename the archive is stored under: `{name}-{version}.{ext}`.
    pub fn archive_file_name(&self) -> String {
        format!("{}-{}.{}", self.name, self.version, self.archive_type)
    }

    /// Check required fields before the feed is used.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::EmptyField`] if `name`, `version` or
    /// `archive_url` is empty, and [`SchemaError::InvalidFileName`] if
    /// `name` or `version` cannot be part of a file name.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyField("name"));
        }
        if self.version.trim().is_empty() {
            return Err(SchemaError::EmptyField("version"));
        }
        if self.archive_url.trim().is_empty() {
            return Err(SchemaError::EmptyField("archive_url"));
        }
        check_file_component("name", &self.name)?;
        check_file_component("version", &self.version)?;
        Ok(())
    }
}

fn check_file_component(field: &'static str, value: &str) -> Result<(), SchemaError> {
    let bad = value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0'])
        || value.contains(':');
    if bad {
        return Err(SchemaError::InvalidFileName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
