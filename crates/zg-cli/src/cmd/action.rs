//! Uninstall and run commands

use anyhow::Result;
use zg_core::{Action, Config, Installer};

use crate::ui::ConsoleReporter;

/// Run `action` from the cached archive of `feed_url`.
pub fn run(config: Config, feed_url: &str, action: Action) -> Result<()> {
    Installer::new(config)
        .with_reporter(ConsoleReporter::new())
        .run_action(feed_url, action)
        .map_err(|e| anyhow::Error::new(e).context(format!("Failed to {action} {feed_url}")))
}
