//! Core library for zg.
//!
//! The installation pipeline is fetch → verify → cache → extract → dispatch,
//! driven by [`Installer`]. Every collaborator the pipeline touches is
//! passed in explicitly through [`Config`], a [`Reporter`] and a
//! [`CommandRunner`]; nothing here reads process-wide state after
//! construction.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod install;
pub mod io;
pub mod records;
pub mod reporter;
pub mod verify;

pub use cache::{ArchiveCache, CacheError, cache_key};
pub use config::{Config, ConfigError};
pub use dispatch::{Action, CommandRunner, DispatchError, ProcessRunner};
pub use install::{InstallError, InstallOptions, InstallOutcome, Installer};
pub use io::fetch::{FetchError, Fetcher, normalize_feed_url};
pub use records::{FeedRecordDb, FeedRepository, RecordError};
pub use reporter::{NullReporter, Reporter};
pub use verify::{Keyring, ResolvedMethod, VerificationMethod, VerifiedBy, VerifyError};

/// User Agent string for feed and archive requests
pub const USER_AGENT: &str = concat!("zg-core/", env!("CARGO_PKG_VERSION"));
