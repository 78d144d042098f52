//! The record kept for each feed imported into the local feed repository.

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A feed imported into the local feed repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    /// URL the feed descriptor was loaded from.
    pub feed_url: String,

    /// Path of the usable archive payload.
    pub feed_archive_path: PathBuf,

    /// Path of the signed message the payload was unwrapped from, when the
    /// feed declared `is_archive_signed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_signed_archive_path: Option<PathBuf>,
}

impl FeedRecord {
    /// Parse a record from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] if the bytes are not a record.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SchemaError> {
        serde_json::from_slice(bytes).map_err(|source| SchemaError::Parse {
            document: "feed record",
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
            document: "feed record",
            source,
        })
    }
}
