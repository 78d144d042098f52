//! Shared wire types for zg.
//!
//! Everything in this crate is plain data plus its JSON codec: the feed
//! descriptor that names an archive, the `install.json` manifest shipped
//! inside that archive, and the record stored by the feed database.
//! No I/O happens here.

pub mod error;
pub mod feed;
pub mod manifest;
pub mod platform;
pub mod record;

// Re-exports
pub use error::SchemaError;
pub use feed::{ArchiveType, Feed};
pub use manifest::{InstallManifest, MANIFEST_FILE_NAME, Platform};
pub use platform::HostPlatform;
pub use record::FeedRecord;
