//! zg - install software from feeds
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! A feed is a small JSON document naming a zip archive and, optionally, a
//! detached OpenPGP signature over it. `zg install` fetches the feed,
//! verifies the archive against the local GnuPG keyring, caches it,
//! extracts it and runs the platform's install command from the archive's
//! `install.json`.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.zerogame/
//! ├── <key>/          # Cache entry per feed URL (SHA-256 of the URL)
//! │   ├── marker.zg   # Names the committed archive
//! │   ├── installed.zg
//! │   └── <name>-<version>.zip
//! ├── archives/<key>/ # Imported feed archives
//! └── db/             # Feed records
//! ```

pub mod cmd;
pub mod ui;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use zg_core::Config;

#[derive(Debug, Parser)]
#[command(name = "zg")]
#[command(author, version, about = "zg - install software from signed feeds")]
pub struct Cli {
    /// HTTP request timeout in seconds
    #[arg(long, global = true, env = "ZG_HTTP_TIMEOUT", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install the archive a feed points to
    Install {
        /// Feed URL (file://, http:// or https://)
        feed_url: String,
        /// Skip signature verification
        #[arg(long)]
        no_verify: bool,
        /// Fetch again even if the feed is cached
        #[arg(long)]
        no_cache: bool,
    },
    /// Run the uninstall command of an installed feed
    Uninstall {
        /// Feed URL the archive was installed from
        feed_url: String,
    },
    /// Run the software provided by an installed feed
    Run {
        /// Feed URL the archive was installed from
        feed_url: String,
    },
    /// Manage the local feed repository
    Feed {
        #[command(subcommand)]
        command: FeedCommands,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum FeedCommands {
    /// Fetch a feed and its archive into the repository
    Import {
        /// Feed URL
        feed_url: String,
    },
    /// List imported feeds
    List,
    /// Remove an imported feed
    Remove {
        /// Feed URL
        feed_url: String,
    },
}

/// Configuration from the environment, with the command-line timeout
/// taking precedence over `ZG_HTTP_TIMEOUT`.
pub fn load_config(timeout: Option<u64>) -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    match timeout {
        Some(secs) => config
            .with_http_timeout(Some(Duration::from_secs(secs)))
            .context("Failed to configure HTTP client"),
        None => Ok(config),
    }
}
