//! Error type shared by every schema codec.

use thiserror::Error;

/// Errors raised while decoding or validating zg documents.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The document is not valid JSON or does not have the expected shape.
    #[error("Failed to parse {document}: {source}")]
    Parse {
        /// Which document was being parsed (e.g. "feed", "install manifest").
        document: &'static str,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The document could not be encoded as JSON.
    #[error("Failed to serialize {document}: {source}")]
    Serialize {
        /// Which document was being serialized.
        document: &'static str,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A required field is present but empty.
    #[error("Empty field: {0}")]
    EmptyField(&'static str),

    /// A field that becomes part of a file name contains a path separator
    /// or is a relative path component.
    #[error("Invalid {field} {value:?}: must not contain path separators or be '.'/'..'")]
    InvalidFileName {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: String,
    },
}
